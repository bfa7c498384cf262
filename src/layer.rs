//! Keymap layer resolution for a live matrix of pressed keys.
//!
//! Keycodes use QMK's 16-bit encoding so keymaps read back from a device
//! (VIA/Vial) can be fed in without translation.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A 16-bit QMK keycode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Keycode(pub u16);

const QK_LAYER_TAP: u16 = 0x4000;
const QK_LAYER_TAP_MAX: u16 = 0x4FFF;
const QK_LAYER_MOD: u16 = 0x5000;
const QK_LAYER_MOD_MAX: u16 = 0x51FF;
const QK_MOMENTARY: u16 = 0x5220;
const QK_MOMENTARY_MAX: u16 = 0x523F;

impl Keycode {
    pub const NO: Keycode = Keycode(0x0000);
    pub const TRANSPARENT: Keycode = Keycode(0x0001);

    /// `MO(layer)`: layer active while held.
    pub const fn mo(layer: u8) -> Self {
        Keycode(QK_MOMENTARY | (layer as u16 & 0x1F))
    }

    /// `LT(layer, kc)`: layer while held, `kc` on tap.
    pub const fn lt(layer: u8, kc: u8) -> Self {
        Keycode(QK_LAYER_TAP | ((layer as u16 & 0x0F) << 8) | kc as u16)
    }

    /// `LM(layer, mods)`: layer plus modifiers while held.
    pub const fn lm(layer: u8, mods: u8) -> Self {
        Keycode(QK_LAYER_MOD | ((layer as u16 & 0x0F) << 5) | (mods as u16 & 0x1F))
    }

    pub fn is_transparent(&self) -> bool {
        *self == Keycode::TRANSPARENT
    }

    /// The layer a momentary layer-switch key activates, if this is one.
    pub fn layer_target(&self) -> Option<u8> {
        match self.0 {
            QK_MOMENTARY..=QK_MOMENTARY_MAX => Some((self.0 & 0x1F) as u8),
            QK_LAYER_TAP..=QK_LAYER_TAP_MAX => Some(((self.0 >> 8) & 0x0F) as u8),
            QK_LAYER_MOD..=QK_LAYER_MOD_MAX => Some(((self.0 >> 5) & 0x0F) as u8),
            _ => None,
        }
    }
}

impl From<u16> for Keycode {
    fn from(code: u16) -> Self {
        Keycode(code)
    }
}

impl fmt::Display for Keycode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0x0000 => write!(f, "KC_NO"),
            0x0001 => write!(f, "KC_TRNS"),
            QK_MOMENTARY..=QK_MOMENTARY_MAX => write!(f, "MO({})", self.0 & 0x1F),
            QK_LAYER_TAP..=QK_LAYER_TAP_MAX => {
                write!(f, "LT({}, 0x{:02X})", (self.0 >> 8) & 0x0F, self.0 & 0xFF)
            }
            QK_LAYER_MOD..=QK_LAYER_MOD_MAX => {
                write!(f, "LM({}, 0x{:02X})", (self.0 >> 5) & 0x0F, self.0 & 0x1F)
            }
            code => write!(f, "0x{code:04X}"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeycodeParseError {
    #[error("unknown keycode `{0}`")]
    Unknown(String),
    #[error("layer {layer} out of range in `{name}`")]
    LayerOutOfRange { name: String, layer: u8 },
    #[error("malformed keycode `{0}`")]
    Malformed(String),
    #[error("position ({layer}, {row}, {col}) does not fit a keymap")]
    PositionOutOfRange { layer: usize, row: usize, col: usize },
}

fn basic_keycode(name: &str) -> Option<u8> {
    let key = name.strip_prefix("KC_").unwrap_or(name);
    if key.len() == 1 {
        let c = key.chars().next()?;
        if c.is_ascii_uppercase() {
            return Some(0x04 + (c as u8 - b'A'));
        }
        if c.is_ascii_digit() {
            // KC_1..KC_9 are 0x1E..0x26, KC_0 is 0x27
            return Some(match c {
                '0' => 0x27,
                d => 0x1E + (d as u8 - b'1'),
            });
        }
    }
    Some(match key {
        "ENT" | "ENTER" => 0x28,
        "ESC" | "ESCAPE" => 0x29,
        "BSPC" | "BACKSPACE" => 0x2A,
        "TAB" => 0x2B,
        "SPC" | "SPACE" => 0x2C,
        "MINS" | "MINUS" => 0x2D,
        "EQL" | "EQUAL" => 0x2E,
        "LBRC" => 0x2F,
        "RBRC" => 0x30,
        "BSLS" => 0x31,
        "SCLN" => 0x33,
        "QUOT" => 0x34,
        "GRV" => 0x35,
        "COMM" | "COMMA" => 0x36,
        "DOT" => 0x37,
        "SLSH" => 0x38,
        "CAPS" => 0x39,
        "LEFT" => 0x50,
        "DOWN" => 0x51,
        "UP" => 0x52,
        "RGHT" | "RIGHT" => 0x4F,
        "LCTL" => 0xE0,
        "LSFT" => 0xE1,
        "LALT" => 0xE2,
        "LGUI" => 0xE3,
        "RCTL" => 0xE4,
        "RSFT" => 0xE5,
        "RALT" => 0xE6,
        "RGUI" => 0xE7,
        _ => return None,
    })
}

fn mod_mask(name: &str) -> Option<u8> {
    name.split('|')
        .map(str::trim)
        .try_fold(0u8, |mask, part| {
            let bits = match part {
                "MOD_LCTL" => 0x01,
                "MOD_LSFT" => 0x02,
                "MOD_LALT" => 0x04,
                "MOD_LGUI" => 0x08,
                "MOD_RCTL" => 0x11,
                "MOD_RSFT" => 0x12,
                "MOD_RALT" => 0x14,
                "MOD_RGUI" => 0x18,
                _ => return None,
            };
            Some(mask | bits)
        })
}

fn parse_layer(name: &str, raw: &str, max: u8) -> Result<u8, KeycodeParseError> {
    let layer: u8 = raw
        .trim()
        .parse()
        .map_err(|_| KeycodeParseError::Malformed(name.to_string()))?;
    if layer > max {
        return Err(KeycodeParseError::LayerOutOfRange {
            name: name.to_string(),
            layer,
        });
    }
    Ok(layer)
}

impl FromStr for Keycode {
    type Err = KeycodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        match name {
            "KC_TRNS" | "KC_TRANSPARENT" | "_______" => return Ok(Keycode::TRANSPARENT),
            "KC_NO" | "XXXXXXX" => return Ok(Keycode::NO),
            _ => {}
        }

        if let Some(hex) = name.strip_prefix("0x").or_else(|| name.strip_prefix("0X")) {
            return u16::from_str_radix(hex, 16)
                .map(Keycode)
                .map_err(|_| KeycodeParseError::Malformed(name.to_string()));
        }

        if let Some((func, rest)) = name.split_once('(') {
            let args = rest
                .strip_suffix(')')
                .ok_or_else(|| KeycodeParseError::Malformed(name.to_string()))?;
            return match func.trim() {
                "MO" => Ok(Keycode::mo(parse_layer(name, args, 31)?)),
                "LT" | "LM" => {
                    let (layer, arg) = args
                        .split_once(',')
                        .ok_or_else(|| KeycodeParseError::Malformed(name.to_string()))?;
                    let layer = parse_layer(name, layer, 15)?;
                    if func.trim() == "LT" {
                        let kc = basic_keycode(arg.trim())
                            .ok_or_else(|| KeycodeParseError::Unknown(arg.trim().to_string()))?;
                        Ok(Keycode::lt(layer, kc))
                    } else {
                        let mods = mod_mask(arg)
                            .ok_or_else(|| KeycodeParseError::Unknown(arg.trim().to_string()))?;
                        Ok(Keycode::lm(layer, mods))
                    }
                }
                _ => Err(KeycodeParseError::Unknown(name.to_string())),
            };
        }

        basic_keycode(name)
            .map(|kc| Keycode(kc as u16))
            .ok_or_else(|| KeycodeParseError::Unknown(name.to_string()))
    }
}

/// Matrix position as `(row, col)`.
pub type Position = (u8, u8);

/// Sparse `(layer, row, col) -> keycode` table. Unbound positions fall
/// through like `KC_TRNS` during resolution and read as `KC_NO` otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keymap {
    codes: HashMap<(u8, u8, u8), Keycode>,
}

impl Keymap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `layers[layer][row][col]` keycode names.
    pub fn from_layers<S: AsRef<str>>(layers: &[Vec<Vec<S>>]) -> Result<Self, KeycodeParseError> {
        let mut keymap = Keymap::new();
        for (layer, rows) in layers.iter().enumerate() {
            for (row, cols) in rows.iter().enumerate() {
                for (col, name) in cols.iter().enumerate() {
                    let (Ok(l), Ok(r), Ok(c)) =
                        (u8::try_from(layer), u8::try_from(row), u8::try_from(col))
                    else {
                        return Err(KeycodeParseError::PositionOutOfRange { layer, row, col });
                    };
                    keymap.set(l, r, c, name.as_ref().parse()?);
                }
            }
        }
        Ok(keymap)
    }

    pub fn set(&mut self, layer: u8, row: u8, col: u8, code: Keycode) {
        self.codes.insert((layer, row, col), code);
    }

    pub fn with(mut self, layer: u8, row: u8, col: u8, code: Keycode) -> Self {
        self.set(layer, row, col, code);
        self
    }

    pub fn get(&self, layer: u8, row: u8, col: u8) -> Option<Keycode> {
        self.codes.get(&(layer, row, col)).copied()
    }

    pub fn code_at(&self, layer: u8, row: u8, col: u8) -> Keycode {
        self.get(layer, row, col).unwrap_or(Keycode::NO)
    }
}

/// The keycode a held key produces given the active layers: highest
/// active layer first, then the base layer, skipping transparent entries.
fn effective_code(keymap: &Keymap, active: &BTreeSet<u8>, base_layer: u8, pos: Position) -> Keycode {
    let (row, col) = pos;
    active
        .iter()
        .rev()
        .filter_map(|&layer| keymap.get(layer, row, col))
        .find(|code| !code.is_transparent())
        .unwrap_or_else(|| keymap.code_at(base_layer, row, col))
}

/// Which layer is in effect for the pressed keys.
///
/// Layer-switch keys are resolved against the layers already turned on,
/// so a key reached through one momentary layer can activate a further
/// one. Keys are visited in `(row, col)` order and a layer counts as active
/// as soon as it is added. The loop ends once a pass adds nothing; every
/// other pass adds a layer, so it runs at most once per distinct layer.
pub fn resolve_effective_layer(
    pressed: &BTreeSet<Position>,
    keymap: &Keymap,
    base_layer: u8,
) -> u8 {
    let mut active: BTreeSet<u8> = BTreeSet::new();

    loop {
        let mut changed = false;
        for &pos in pressed {
            let code = effective_code(keymap, &active, base_layer, pos);
            if let Some(layer) = code.layer_target() {
                changed |= active.insert(layer.max(base_layer));
            }
        }
        if !changed {
            break;
        }
    }

    active.last().copied().unwrap_or(base_layer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pressed(keys: &[Position]) -> BTreeSet<Position> {
        keys.iter().copied().collect()
    }

    #[test]
    fn encodes_qmk_layer_keys() {
        assert_eq!(Keycode::mo(1), Keycode(0x5221));
        assert_eq!(Keycode::lt(2, 0x2C), Keycode(0x422C));
        assert_eq!(Keycode::lm(1, 0x02), Keycode(0x5022));
        assert_eq!(Keycode::mo(3).layer_target(), Some(3));
        assert_eq!(Keycode::lt(5, 0x04).layer_target(), Some(5));
        assert_eq!(Keycode::lm(4, 0x01).layer_target(), Some(4));
        assert_eq!(Keycode(0x0004).layer_target(), None);
        assert_eq!(Keycode::TRANSPARENT.layer_target(), None);
    }

    #[test]
    fn parses_keycode_names() {
        assert_eq!("KC_A".parse(), Ok(Keycode(0x04)));
        assert_eq!("KC_Z".parse(), Ok(Keycode(0x1D)));
        assert_eq!("KC_1".parse(), Ok(Keycode(0x1E)));
        assert_eq!("KC_0".parse(), Ok(Keycode(0x27)));
        assert_eq!("KC_SPC".parse(), Ok(Keycode(0x2C)));
        assert_eq!("_______".parse(), Ok(Keycode::TRANSPARENT));
        assert_eq!("XXXXXXX".parse(), Ok(Keycode::NO));
        assert_eq!("MO(2)".parse(), Ok(Keycode::mo(2)));
        assert_eq!("LT(1, KC_SPC)".parse(), Ok(Keycode::lt(1, 0x2C)));
        assert_eq!("LM(3, MOD_LSFT | MOD_LCTL)".parse(), Ok(Keycode::lm(3, 0x03)));
        assert_eq!("0x5221".parse(), Ok(Keycode::mo(1)));
    }

    #[test]
    fn rejects_bad_names() {
        assert_eq!(
            "KC_WAT".parse::<Keycode>(),
            Err(KeycodeParseError::Unknown("KC_WAT".into()))
        );
        assert_eq!(
            "MO(x)".parse::<Keycode>(),
            Err(KeycodeParseError::Malformed("MO(x)".into()))
        );
        assert_eq!(
            "LT(16, KC_A)".parse::<Keycode>(),
            Err(KeycodeParseError::LayerOutOfRange {
                name: "LT(16, KC_A)".into(),
                layer: 16
            })
        );
        assert!("MO(1".parse::<Keycode>().is_err());
    }

    #[test]
    fn display_round_trips_layer_keys() {
        assert_eq!(Keycode::mo(1).to_string(), "MO(1)");
        assert_eq!(Keycode::TRANSPARENT.to_string(), "KC_TRNS");
        assert_eq!(Keycode(0x0004).to_string(), "0x0004");
    }

    #[test]
    fn momentary_hold_and_release() {
        let keymap = Keymap::new().with(0, 3, 0, Keycode::mo(1));
        assert_eq!(resolve_effective_layer(&pressed(&[(3, 0)]), &keymap, 0), 1);
        assert_eq!(resolve_effective_layer(&pressed(&[]), &keymap, 0), 0);
    }

    #[test]
    fn highest_of_simultaneous_holds_wins() {
        let keymap = Keymap::new()
            .with(0, 3, 0, Keycode::mo(1))
            .with(0, 3, 1, Keycode::mo(2));
        assert_eq!(
            resolve_effective_layer(&pressed(&[(3, 0), (3, 1)]), &keymap, 0),
            2
        );
    }

    #[test]
    fn higher_layer_override_suppresses_lower_switch() {
        // Layer 1 rebinds (3,1) to a plain key, so holding it while on
        // layer 1 must not reach layer 2.
        let keymap = Keymap::new()
            .with(0, 3, 0, Keycode::mo(1))
            .with(0, 3, 1, Keycode::mo(2))
            .with(1, 3, 0, Keycode::TRANSPARENT)
            .with(1, 3, 1, Keycode(0x04));
        assert_eq!(
            resolve_effective_layer(&pressed(&[(3, 0), (3, 1)]), &keymap, 0),
            1
        );
    }

    #[test]
    fn nested_momentary_layers_cascade() {
        // (3,1) is a plain key on layer 0 but MO(2) on layer 1.
        let keymap = Keymap::new()
            .with(0, 3, 0, Keycode::mo(1))
            .with(0, 3, 1, Keycode(0x05))
            .with(1, 3, 0, Keycode::TRANSPARENT)
            .with(1, 3, 1, Keycode::mo(2))
            .with(2, 3, 0, Keycode::TRANSPARENT)
            .with(2, 3, 1, Keycode::TRANSPARENT);
        assert_eq!(
            resolve_effective_layer(&pressed(&[(3, 0), (3, 1)]), &keymap, 0),
            2
        );
        assert_eq!(resolve_effective_layer(&pressed(&[(3, 1)]), &keymap, 0), 0);
    }

    #[test]
    fn layer_tap_and_layer_mod_activate() {
        let keymap = Keymap::new()
            .with(0, 0, 0, Keycode::lt(3, 0x2C))
            .with(0, 0, 1, Keycode::lm(2, 0x02));
        assert_eq!(resolve_effective_layer(&pressed(&[(0, 0)]), &keymap, 0), 3);
        assert_eq!(resolve_effective_layer(&pressed(&[(0, 1)]), &keymap, 0), 2);
    }

    #[test]
    fn target_below_base_clamps_to_base() {
        let keymap = Keymap::new().with(2, 0, 0, Keycode::mo(1));
        assert_eq!(resolve_effective_layer(&pressed(&[(0, 0)]), &keymap, 2), 2);
    }

    #[test]
    fn plain_keys_keep_base_layer() {
        let keymap = Keymap::new().with(1, 0, 0, Keycode(0x04));
        assert_eq!(resolve_effective_layer(&pressed(&[(0, 0), (5, 5)]), &keymap, 1), 1);
    }

    #[test]
    fn resolution_is_pure() {
        let keymap = Keymap::new()
            .with(0, 3, 0, Keycode::mo(1))
            .with(1, 3, 1, Keycode::mo(3));
        let keys = pressed(&[(3, 0), (3, 1)]);
        let first = resolve_effective_layer(&keys, &keymap, 0);
        assert_eq!(first, 3);
        assert_eq!(resolve_effective_layer(&keys, &keymap, 0), first);
    }

    #[test]
    fn keymap_from_layer_names() {
        let layers = vec![
            vec![vec!["KC_A", "MO(1)"]],
            vec![vec!["KC_B", "_______"]],
        ];
        let keymap = Keymap::from_layers(&layers).unwrap();
        assert_eq!(keymap.code_at(0, 0, 1), Keycode::mo(1));
        assert_eq!(keymap.code_at(1, 0, 0), Keycode(0x05));
        assert_eq!(keymap.code_at(4, 4, 4), Keycode::NO);
        assert_eq!(resolve_effective_layer(&pressed(&[(0, 1)]), &keymap, 0), 1);
    }
}
