//! PC keyboard to remote control key translation.

// linux/input-event-codes.h
pub const KEY_ESC: u16 = 1;
pub const KEY_E: u16 = 18;
pub const KEY_I: u16 = 23;
pub const KEY_P: u16 = 25;
pub const KEY_ENTER: u16 = 28;
pub const KEY_H: u16 = 35;
pub const KEY_M: u16 = 50;
pub const KEY_F1: u16 = 59;
pub const KEY_F2: u16 = 60;
pub const KEY_F3: u16 = 61;
pub const KEY_F4: u16 = 62;
pub const KEY_F5: u16 = 63;
pub const KEY_F6: u16 = 64;
pub const KEY_F7: u16 = 65;
pub const KEY_F8: u16 = 66;
pub const KEY_F10: u16 = 68;
pub const KEY_F11: u16 = 87;
pub const KEY_F12: u16 = 88;

pub const KEY_MUTE: u16 = 113;
pub const KEY_VOLUMEDOWN: u16 = 114;
pub const KEY_VOLUMEUP: u16 = 115;
pub const KEY_POWER: u16 = 116;
pub const KEY_HELP: u16 = 138;
pub const KEY_MENU: u16 = 139;
pub const KEY_SLEEP: u16 = 142;
pub const KEY_WWW: u16 = 150;
pub const KEY_EXIT: u16 = 174;
pub const KEY_MOVE: u16 = 175;
pub const KEY_OK: u16 = 0x160;
pub const KEY_INFO: u16 = 0x166;
pub const KEY_EPG: u16 = 0x16d;
pub const KEY_SUBTITLE: u16 = 0x172;
pub const KEY_RED: u16 = 0x18e;
pub const KEY_GREEN: u16 = 0x18f;
pub const KEY_YELLOW: u16 = 0x190;
pub const KEY_BLUE: u16 = 0x191;

const KEYMAP: &[(u16, u16)] = &[
    (KEY_ENTER, KEY_OK),
    (KEY_ESC, KEY_EXIT),
    (KEY_E, KEY_EPG),
    (KEY_I, KEY_INFO),
    (KEY_M, KEY_MENU),
    // volume on F-keys, letters depend on the keyboard layout
    (KEY_F12, KEY_VOLUMEUP),
    (KEY_F11, KEY_VOLUMEDOWN),
    (KEY_F10, KEY_MUTE),
    (KEY_H, KEY_HELP),
    (KEY_P, KEY_POWER),
    (KEY_F1, KEY_RED),
    (KEY_F2, KEY_GREEN),
    (KEY_F3, KEY_YELLOW),
    (KEY_F4, KEY_BLUE),
    (KEY_F5, KEY_WWW),
    (KEY_F6, KEY_SUBTITLE),
    (KEY_F7, KEY_MOVE),
    (KEY_F8, KEY_SLEEP),
];

/// Remote control code for a keyboard code; unmapped codes pass through.
pub fn remap(code: u16) -> u16 {
    KEYMAP
        .iter()
        .find(|(from, _)| *from == code)
        .map_or(code, |(_, to)| *to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remap() {
        assert_eq!(remap(KEY_ENTER), KEY_OK);
        assert_eq!(remap(KEY_ESC), KEY_EXIT);
        assert_eq!(remap(KEY_F1), 398);
        assert_eq!(remap(KEY_F4), 401);
        assert_eq!(remap(KEY_F6), KEY_SUBTITLE);
        assert_eq!(remap(KEY_F12), KEY_VOLUMEUP);
    }

    #[test]
    fn test_unmapped_codes_pass_through() {
        assert_eq!(remap(KEY_OK), KEY_OK);
        // KEY_A
        assert_eq!(remap(30), 30);
        assert_eq!(remap(0), 0);
    }
}
