//! Property generators - turn a packed coordinate into style declarations
//!
//! Built-in properties are a closed enum. Callers may register extra generators by name,
//! which also shadow a built-in of the same name.

use crate::compose::PackedCoordinate;
use crate::config::ConfigError;
use crate::stylesheet::Declaration;
use crate::template::OutputTargets;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Name reserved for the directive itself (`sprite-prop`); no alias or generator may use it
pub const RESERVED_NAME: &str = "prop";

/// Properties every registry knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinProperty {
    Width,
    Height,
    /// Shorthand: image declarations, `no-repeat` and (high-density only) size
    Background,
    BackgroundImage,
    BackgroundSize,
    BackgroundPosition,
}

impl BuiltinProperty {
    pub const ALL: [BuiltinProperty; 6] = [
        BuiltinProperty::Width,
        BuiltinProperty::Height,
        BuiltinProperty::Background,
        BuiltinProperty::BackgroundImage,
        BuiltinProperty::BackgroundSize,
        BuiltinProperty::BackgroundPosition,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuiltinProperty::Width => "width",
            BuiltinProperty::Height => "height",
            BuiltinProperty::Background => "background",
            BuiltinProperty::BackgroundImage => "background-image",
            BuiltinProperty::BackgroundSize => "background-size",
            BuiltinProperty::BackgroundPosition => "background-position",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

/// Everything a generator may look at for one intent
#[derive(Debug, Clone, Copy)]
pub struct GeneratorContext<'a> {
    pub coordinate: &'a PackedCoordinate,
    pub targets: &'a OutputTargets,
    /// The element reference as written in the stylesheet
    pub element: &'a str,
    /// Resolved element file
    pub path: &'a Path,
    /// Normal density requested, explicitly or through force-normal
    pub normal: bool,
    /// All properties the intent asked for, in order
    pub properties: &'a [String],
    /// The stylesheet being processed
    pub input: Option<&'a Path>,
}

impl GeneratorContext<'_> {
    /// Whether a high-density sheet exists
    pub fn is_retina(&self) -> bool {
        self.targets.retina.is_some()
    }

    /// Whether pixel values must be halved
    pub fn divides(&self) -> bool {
        self.normal && self.is_retina()
    }
}

/// A caller supplied generator
pub type GeneratorFn = Arc<dyn Fn(&GeneratorContext<'_>) -> Vec<Declaration> + Send + Sync>;

/// Which URL the plain `background-image` fallback points at
#[derive(Clone, Default)]
pub enum BackgroundImageMode {
    /// The density the intent requested
    #[default]
    Auto,
    /// Always the normal sheet
    Normal,
    Custom(GeneratorFn),
}

#[derive(Clone, Default)]
pub enum BackgroundSizeMode {
    /// Halved only when normal density is requested
    #[default]
    Auto,
    /// Halved whenever a high-density sheet exists
    Normal,
    Custom(GeneratorFn),
}

#[derive(Clone, Default)]
pub enum BackgroundPositionMode {
    /// Negative pixel offset, halved when normal density is requested
    #[default]
    Pixel,
    /// Negative pixel offset, halved whenever a high-density sheet exists
    Normal,
    /// Offset as a percentage of the free space around the element
    Percent,
    Custom(GeneratorFn),
}

macro_rules! debug_mode {
    ($ty:ident { $($variant:ident),* }) => {
        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $($ty::$variant => f.write_str(stringify!($variant)),)*
                    $ty::Custom(_) => f.write_str("Custom(..)"),
                }
            }
        }
    };
}

debug_mode!(BackgroundImageMode { Auto, Normal });
debug_mode!(BackgroundSizeMode { Auto, Normal });
debug_mode!(BackgroundPositionMode { Pixel, Normal, Percent });

/// How a property name resolved
pub enum PropertyKind<'a> {
    Builtin(BuiltinProperty),
    Custom(&'a GeneratorFn),
}

/// The property table used to rewrite intents
#[derive(Clone, Default)]
pub struct PropertyRegistry {
    custom: HashMap<String, GeneratorFn>,
    pub image_mode: BackgroundImageMode,
    pub size_mode: BackgroundSizeMode,
    pub position_mode: BackgroundPositionMode,
}

impl std::fmt::Debug for PropertyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut custom: Vec<_> = self.custom.keys().collect();
        custom.sort();
        f.debug_struct("PropertyRegistry")
            .field("custom", &custom)
            .field("image_mode", &self.image_mode)
            .field("size_mode", &self.size_mode)
            .field("position_mode", &self.position_mode)
            .finish()
    }
}

impl PropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in generators configured by the given modes
    pub fn with_modes(
        image_mode: BackgroundImageMode,
        size_mode: BackgroundSizeMode,
        position_mode: BackgroundPositionMode,
    ) -> Self {
        Self { custom: HashMap::new(), image_mode, size_mode, position_mode }
    }

    /// Add or override a generator.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        generator: GeneratorFn,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        if name == RESERVED_NAME {
            return Err(ConfigError::ReservedName(name));
        }
        self.custom.insert(name, generator);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn lookup(&self, name: &str) -> Option<PropertyKind<'_>> {
        match self.custom.get(name) {
            Some(generator) => Some(PropertyKind::Custom(generator)),
            None => BuiltinProperty::from_name(name).map(PropertyKind::Builtin),
        }
    }

    /// Generate the declarations for `name`, or `None` if the name is unknown.
    pub fn generate(&self, name: &str, ctx: &GeneratorContext<'_>) -> Option<Vec<Declaration>> {
        Some(match self.lookup(name)? {
            PropertyKind::Custom(generator) => generator(ctx),
            PropertyKind::Builtin(builtin) => self.builtin(builtin, ctx),
        })
    }

    fn builtin(&self, property: BuiltinProperty, ctx: &GeneratorContext<'_>) -> Vec<Declaration> {
        let c = ctx.coordinate;
        let divide = if ctx.divides() { 2.0 } else { 1.0 };
        match property {
            BuiltinProperty::Width => {
                vec![Declaration::new("width", length(c.width as f64 / divide))]
            }
            BuiltinProperty::Height => {
                vec![Declaration::new("height", length(c.height as f64 / divide))]
            }
            BuiltinProperty::BackgroundImage => self.background_image(ctx),
            BuiltinProperty::BackgroundSize => self.background_size(ctx),
            BuiltinProperty::BackgroundPosition => self.background_position(ctx),
            BuiltinProperty::Background => {
                // Goes through the table so overrides of the parts apply to the shorthand
                let mut out = self.generate("background-image", ctx).unwrap_or_default();
                out.push(Declaration::new("background-repeat", "no-repeat"));
                if ctx.is_retina() {
                    out.extend(self.generate("background-size", ctx).unwrap_or_default());
                }
                out
            }
        }
    }

    fn background_image(&self, ctx: &GeneratorContext<'_>) -> Vec<Declaration> {
        let normal = &ctx.targets.normal.public;
        let Some(retina) = ctx.targets.retina.as_ref().map(|r| &r.public) else {
            if let BackgroundImageMode::Custom(generator) = &self.image_mode {
                return generator(ctx);
            }
            return vec![Declaration::new("background-image", format!("url({})", normal))];
        };

        let fallback = match &self.image_mode {
            BackgroundImageMode::Custom(generator) => return generator(ctx),
            BackgroundImageMode::Normal => normal,
            BackgroundImageMode::Auto if ctx.divides() => normal,
            BackgroundImageMode::Auto => retina,
        };
        vec![
            Declaration::new("background-image", format!("url({})", fallback)),
            Declaration::new(
                "background-image",
                format!("-webkit-image-set(url({}) 1x, url({}) 2x)", normal, retina),
            ),
        ]
    }

    fn background_size(&self, ctx: &GeneratorContext<'_>) -> Vec<Declaration> {
        let halve = match &self.size_mode {
            BackgroundSizeMode::Custom(generator) => return generator(ctx),
            BackgroundSizeMode::Auto => ctx.divides(),
            BackgroundSizeMode::Normal => ctx.is_retina(),
        };
        let divide = if halve { 2.0 } else { 1.0 };
        let c = ctx.coordinate;
        let value = format!(
            "{} {}",
            zero_or_length(c.sheet_width as f64 / divide),
            zero_or_length(c.sheet_height as f64 / divide)
        );
        vec![Declaration::new("background-size", value)]
    }

    fn background_position(&self, ctx: &GeneratorContext<'_>) -> Vec<Declaration> {
        let c = ctx.coordinate;
        let value = match &self.position_mode {
            BackgroundPositionMode::Custom(generator) => return generator(ctx),
            BackgroundPositionMode::Percent => format!(
                "{} {}",
                percent(c.x, c.sheet_width, c.width),
                percent(c.y, c.sheet_height, c.height)
            ),
            mode => {
                let halve = match mode {
                    BackgroundPositionMode::Normal => ctx.is_retina(),
                    _ => ctx.divides(),
                };
                let divide = if halve { -2.0 } else { -1.0 };
                format!(
                    "{} {}",
                    zero_or_length(c.x as f64 / divide),
                    zero_or_length(c.y as f64 / divide)
                )
            }
        };
        vec![Declaration::new("background-position", value)]
    }
}

/// Format a number without a trailing `.0`
fn number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn length(value: f64) -> String {
    format!("{}px", number(value))
}

/// Zero lengths are written without a unit
fn zero_or_length(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else {
        length(value)
    }
}

fn percent(offset: u32, sheet: u32, element: u32) -> String {
    let free = sheet.saturating_sub(element);
    if offset == 0 || free == 0 {
        return "0".to_string();
    }
    let fixed = format!("{:.4}", offset as f64 / free as f64 * 100.0);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    format!("{}%", trimmed)
}
