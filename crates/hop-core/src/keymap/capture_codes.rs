//! Capture key code → HID usage id table.
//!
//! Forwarded `kd`/`ku` messages carry the capture layer's one-byte key code
//! (`c`).  These follow the classic DOM `keyCode` numbering, which matches the
//! Windows virtual-key numbering for every key listed here: letters are their
//! upper-case ASCII value, `16` is shift, `91` is the command/meta key, and so
//! on.
//!
//! The table is a 256-entry array indexed by code, so a lookup is a single
//! bounds-free index.

use super::hid::HidKeyCode;

/// Translates a capture key code to a HID usage id.
///
/// Returns [`HidKeyCode::Unknown`] for codes with no keyboard mapping.
pub fn capture_code_to_hid(code: u8) -> HidKeyCode {
    CODE_TO_HID[code as usize]
}

const CODE_TO_HID: [HidKeyCode; 256] = {
    use HidKeyCode::*;
    let mut t = [Unknown; 256];

    // ── Editing and whitespace ────────────────────────────────────────────────
    t[8] = Backspace;
    t[9] = Tab;
    t[13] = Enter;
    t[19] = Pause;
    t[20] = CapsLock;
    t[27] = Escape;
    t[32] = Space;

    // ── Modifiers ─────────────────────────────────────────────────────────────
    t[16] = ShiftLeft;
    t[17] = ControlLeft;
    t[18] = AltLeft;
    t[91] = MetaLeft;

    // ── Navigation ────────────────────────────────────────────────────────────
    t[33] = PageUp;
    t[34] = PageDown;
    t[35] = End;
    t[36] = Home;
    t[37] = ArrowLeft;
    t[38] = ArrowUp;
    t[39] = ArrowRight;
    t[40] = ArrowDown;
    t[44] = PrintScreen;
    t[45] = Insert;
    t[46] = Delete;

    // ── Digits (48–57) ────────────────────────────────────────────────────────
    t[48] = Digit0;
    t[49] = Digit1;
    t[50] = Digit2;
    t[51] = Digit3;
    t[52] = Digit4;
    t[53] = Digit5;
    t[54] = Digit6;
    t[55] = Digit7;
    t[56] = Digit8;
    t[57] = Digit9;

    // ── Letters (65–90) ───────────────────────────────────────────────────────
    t[65] = KeyA;
    t[66] = KeyB;
    t[67] = KeyC;
    t[68] = KeyD;
    t[69] = KeyE;
    t[70] = KeyF;
    t[71] = KeyG;
    t[72] = KeyH;
    t[73] = KeyI;
    t[74] = KeyJ;
    t[75] = KeyK;
    t[76] = KeyL;
    t[77] = KeyM;
    t[78] = KeyN;
    t[79] = KeyO;
    t[80] = KeyP;
    t[81] = KeyQ;
    t[82] = KeyR;
    t[83] = KeyS;
    t[84] = KeyT;
    t[85] = KeyU;
    t[86] = KeyV;
    t[87] = KeyW;
    t[88] = KeyX;
    t[89] = KeyY;
    t[90] = KeyZ;

    // ── Numpad (96–111) ───────────────────────────────────────────────────────
    t[96] = Numpad0;
    t[97] = Numpad1;
    t[98] = Numpad2;
    t[99] = Numpad3;
    t[100] = Numpad4;
    t[101] = Numpad5;
    t[102] = Numpad6;
    t[103] = Numpad7;
    t[104] = Numpad8;
    t[105] = Numpad9;
    t[106] = NumpadMultiply;
    t[107] = NumpadAdd;
    t[109] = NumpadSubtract;
    t[110] = NumpadDecimal;
    t[111] = NumpadDivide;

    // ── Function keys (112–123) ───────────────────────────────────────────────
    t[112] = F1;
    t[113] = F2;
    t[114] = F3;
    t[115] = F4;
    t[116] = F5;
    t[117] = F6;
    t[118] = F7;
    t[119] = F8;
    t[120] = F9;
    t[121] = F10;
    t[122] = F11;
    t[123] = F12;

    t[144] = NumLock;
    t[145] = ScrollLock;

    // ── Punctuation (US layout) ───────────────────────────────────────────────
    t[186] = Semicolon;
    t[187] = Equal;
    t[188] = Comma;
    t[189] = Minus;
    t[190] = Period;
    t[191] = Slash;
    t[192] = Backquote;
    t[219] = BracketLeft;
    t[220] = Backslash;
    t[221] = BracketRight;
    t[222] = Quote;

    t
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_map_from_ascii_uppercase() {
        assert_eq!(capture_code_to_hid(b'A'), HidKeyCode::KeyA);
        assert_eq!(capture_code_to_hid(b'Z'), HidKeyCode::KeyZ);
    }

    #[test]
    fn test_modifier_codes_map_to_left_modifiers() {
        assert_eq!(capture_code_to_hid(16), HidKeyCode::ShiftLeft);
        assert_eq!(capture_code_to_hid(17), HidKeyCode::ControlLeft);
        assert_eq!(capture_code_to_hid(18), HidKeyCode::AltLeft);
        assert_eq!(capture_code_to_hid(91), HidKeyCode::MetaLeft);
    }

    #[test]
    fn test_unmapped_code_is_unknown() {
        assert_eq!(capture_code_to_hid(0), HidKeyCode::Unknown);
        assert_eq!(capture_code_to_hid(255), HidKeyCode::Unknown);
    }
}
