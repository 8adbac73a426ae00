//! Plotter glyph vocabulary: stroke vectors for the built-in character
//! sets, in a 48x32 cell, plus the per-charset code translations.

/// One glyph: centering offset (for symbol mode), auto-backspace flag
/// and the pen moves drawing it.  Deltas are in cell sub-units
/// (1 character width = 48, 1 height = 32).
pub struct Glyph {
    pub center: (i32, i32),
    pub backspace: bool,
    pub moves: &'static [(bool, i32, i32)],
}

pub static FONT: [Option<Glyph>; 121] = [
    // 00
    Some(Glyph {
        center: (-1, -16),
        backspace: false,
        moves: &[(false, 0, 0), (true, 2, 0), (true, 0, 2), (true, -2, 0), (true, 0, -2), (false, 1, 11), (true, 0, 21)],
    }),
    // 01
    Some(Glyph {
        center: (-16, -31),
        backspace: false,
        moves: &[(false, 10, 26), (true, 0, 10), (false, 12, 0), (true, 0, -10)],
    }),
    // 02
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 4, 0), (true, 12, 32), (false, 12, 0), (true, -12, -32), (false, 16, 12), (true, -32, 0), (false, 0, 8), (true, 32, 0)],
    }),
    // 03
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 6), (true, 2, -3), (true, 5, -2), (true, 18, 0), (true, 5, 2), (true, 2, 3), (true, 0, 5), (true, -2, 3), (true, -5, 2), (true, -18, 1), (true, -5, 2), (true, -2, 3), (true, 0, 4), (true, 2, 3), (true, 5, 2), (true, 17, 0), (true, 5, -2), (true, 2, -3), (false, -15, 10), (true, 0, -40)],
    }),
    // 04
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 0), (true, 32, 32), (false, -22, 0), (true, -6, 0), (true, -3, -1), (true, -1, -2), (true, 0, -5), (true, 1, -2), (true, 3, -1), (true, 6, 0), (true, 3, 1), (true, 1, 2), (true, 0, 5), (true, -1, 2), (true, -3, 1), (false, 12, -21), (true, -3, -1), (true, -1, -2), (true, 0, -5), (true, 1, -2), (true, 3, -1), (true, 6, 0), (true, 3, 1), (true, 1, 2), (true, 0, 5), (true, -1, 2), (true, -3, 1), (true, -6, 0)],
    }),
    // 05
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 8, 19), (true, -6, -3), (true, -2, -4), (true, 0, -5), (true, 2, -4), (true, 4, -2), (true, 5, -1), (true, 10, 0), (true, 5, 1), (true, 4, 2), (true, 2, 4), (true, 0, 6), (false, -3, 12), (true, 0, 3), (true, -2, 3), (true, -5, 1), (true, -11, 0), (true, -5, -1), (true, -2, -3), (true, 0, -4), (true, 2, -3), (true, 26, -21)],
    }),
    // 06
    Some(Glyph {
        center: (-16, -30),
        backspace: false,
        moves: &[(false, 15, 27), (true, 2, 1), (true, 1, 1), (true, 0, 5), (true, -3, 0), (true, 0, -2), (true, 3, 0)],
    }),
    // 07
    Some(Glyph {
        center: (-28, -16),
        backspace: false,
        moves: &[(false, 32, -4), (true, -4, 4), (true, -3, 5), (true, -1, 5), (true, 0, 12), (true, 1, 5), (true, 3, 5), (true, 4, 4)],
    }),
    // 08
    Some(Glyph {
        center: (-4, -16),
        backspace: false,
        moves: &[(false, 0, -4), (true, 4, 4), (true, 3, 5), (true, 1, 5), (true, 0, 12), (true, -1, 5), (true, -3, 5), (true, -4, 4)],
    }),
    // 09
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 4, 4), (true, 24, 24), (false, 4, -12), (true, -32, 0), (false, 4, 12), (true, 24, -24)],
    }),
    // 0a
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 16, 4), (true, 0, 24), (false, -16, -12), (true, 32, 0)],
    }),
    // 0b
    Some(Glyph {
        center: (-1, 1),
        backspace: false,
        moves: &[(false, 3, 0), (true, -3, 0), (true, 0, 2), (true, 3, 0), (true, 0, -5), (true, -1, -1), (true, -2, -1)],
    }),
    // 0c
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 16), (true, 32, 0)],
    }),
    // 0d
    Some(Glyph {
        center: (-16, -1),
        backspace: false,
        moves: &[(false, 15, 0), (true, 0, 2), (true, 3, 0), (true, 0, -2), (true, -3, 0)],
    }),
    // 0e
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, -4), (true, 32, 40)],
    }),
    // 0f
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 14, 0), (true, -7, 2), (true, -3, 3), (true, -3, 6), (true, 0, 10), (true, 3, 6), (true, 3, 3), (true, 6, 2), (true, 6, 0), (true, 6, -2), (true, 3, -3), (true, 3, -6), (true, 0, -10), (true, -3, -6), (true, -3, -3), (true, -6, -2), (true, -5, 0)],
    }),
    // 10
    Some(Glyph {
        center: (-18, -16),
        backspace: false,
        moves: &[(false, 8, 20), (true, 12, 12), (true, 0, -32), (false, -12, 0), (true, 20, 0)],
    }),
    // 11
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 1, 26), (true, 2, 4), (true, 6, 2), (true, 15, 0), (true, 6, -2), (true, 2, -4), (true, 0, -5), (true, -2, -4), (true, -6, -2), (true, -16, -2), (true, -5, -3), (true, -3, -10), (true, 32, 0)],
    }),
    // 12
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 1, 27), (true, 2, 3), (true, 5, 2), (true, 16, 0), (true, 5, -2), (true, 2, -4), (true, 0, -3), (true, -2, -4), (true, -4, -2), (true, -15, 0), (false, 15, 0), (true, 5, -2), (true, 2, -4), (true, 0, -5), (true, -2, -4), (true, -5, -2), (true, -18, 0), (true, -5, 2), (true, -2, 4)],
    }),
    // 13
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 32, 8), (true, -32, 0), (true, 28, 24), (true, 0, -32)],
    }),
    // 14
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 5), (true, 2, -3), (true, 6, -2), (true, 16, 0), (true, 6, 2), (true, 2, 4), (true, 0, 9), (true, -2, 4), (true, -6, 2), (true, -15, 0), (true, -6, -2), (true, -3, -3), (true, 0, 16), (true, 32, 0)],
    }),
    // 15
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 12), (true, 2, 4), (true, 5, 2), (true, 18, 0), (true, 5, -2), (true, 2, -4), (true, 0, -6), (true, -2, -4), (true, -5, -2), (true, -18, 0), (true, -5, 2), (true, -2, 4), (true, 0, 20), (true, 2, 4), (true, 5, 2), (true, 18, 0), (true, 5, -2), (true, 2, -4)],
    }),
    // 16
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 32), (true, 32, 0), (true, -24, -32)],
    }),
    // 17
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 7, 17), (true, -4, 2), (true, -2, 4), (true, 0, 4), (true, 2, 3), (true, 5, 2), (true, 16, 0), (true, 5, -2), (true, 2, -4), (true, 0, -3), (true, -2, -4), (true, -4, -2), (true, -18, 0), (true, -5, -2), (true, -2, -4), (true, 0, -5), (true, 2, -4), (true, 5, -2), (true, 18, 0), (true, 5, 2), (true, 2, 4), (true, 0, 5), (true, -2, 4), (true, -5, 2)],
    }),
    // 18
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 6), (true, 2, -4), (true, 5, -2), (true, 18, 0), (true, 5, 2), (true, 2, 4), (true, 0, 20), (true, -2, 4), (true, -5, 2), (true, -18, 0), (true, -5, -2), (true, -2, -4), (true, 0, -6), (true, 2, -4), (true, 5, -2), (true, 18, 0), (true, 5, 2), (true, 2, 4)],
    }),
    // 19
    Some(Glyph {
        center: (-1, -12),
        backspace: false,
        moves: &[(false, 0, 0), (true, 0, 2), (true, 3, 0), (true, 0, -2), (true, -3, 0), (false, 0, 22), (true, 0, 2), (true, 3, 0), (true, 0, -2), (true, -3, 0)],
    }),
    // 1a
    Some(Glyph {
        center: (-1, -9),
        backspace: false,
        moves: &[(false, 3, 0), (true, -3, 0), (true, 0, 2), (true, 3, 0), (true, 0, -5), (true, -1, -1), (true, -2, -1), (false, 0, 27), (true, 0, 2), (true, 3, 0), (true, 0, -2), (true, -3, 0)],
    }),
    // 1b
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 32, 4), (true, -32, 12), (true, 32, 12)],
    }),
    // 1c
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 12), (true, 32, 0), (false, -32, 8), (true, 32, 0)],
    }),
    // 1d
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 4), (true, 32, 12), (true, -32, 12)],
    }),
    // 1e
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 27), (true, 2, 3), (true, 5, 2), (true, 18, 0), (true, 5, -2), (true, 2, -3), (true, 0, -6), (true, -2, -3), (true, -5, -2), (true, -8, -1), (true, -2, -2), (true, -1, -3), (false, -1, -8), (true, 3, 0), (true, 0, -2), (true, -3, 0), (true, 0, 2)],
    }),
    // 1f
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 28, 0), (true, -18, 0), (true, -6, 1), (true, -3, 3), (true, -1, 4), (true, 0, 16), (true, 1, 4), (true, 3, 3), (true, 6, 1), (true, 12, 0), (true, 6, -1), (true, 3, -3), (true, 1, -4), (true, 0, -11), (true, -3, -3), (true, -4, -1), (true, -9, 0), (true, -4, 1), (true, -3, 3), (true, 0, 6), (true, 3, 3), (true, 4, 1), (true, 9, 0), (true, 4, -1), (true, 3, -3)],
    }),
    // 20
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 0), (true, 16, 32), (true, 16, -32), (false, -28, 8), (true, 24, 0)],
    }),
    // 21
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 0), (true, 0, 32), (true, 24, 0), (true, 5, -2), (true, 2, -3), (true, 0, -5), (true, -2, -3), (true, -5, -2), (true, 6, -2), (true, 2, -4), (true, 0, -5), (true, -2, -4), (true, -6, -2), (true, -24, 0), (false, 0, 17), (true, 24, 0)],
    }),
    // 22
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 31, 7), (true, -1, -3), (true, -3, -3), (true, -7, -1), (true, -8, 0), (true, -7, 1), (true, -3, 3), (true, -2, 6), (true, 0, 12), (true, 2, 6), (true, 3, 3), (true, 7, 1), (true, 8, 0), (true, 7, -1), (true, 3, -3), (true, 1, -3)],
    }),
    // 23
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 0), (true, 0, 32), (true, 20, 0), (true, 7, -1), (true, 3, -3), (true, 2, -6), (true, 0, -12), (true, -2, -6), (true, -3, -3), (true, -7, -1), (true, -20, 0)],
    }),
    // 24
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 32, 0), (true, -32, 0), (true, 0, 32), (true, 32, 0), (false, -32, -15), (true, 26, 0)],
    }),
    // 25
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 0), (true, 0, 32), (true, 32, 0), (false, -32, -15), (true, 24, 0)],
    }),
    // 26
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 30, 28), (true, -3, 3), (true, -7, 1), (true, -8, 0), (true, -7, -1), (true, -3, -3), (true, -2, -6), (true, 0, -12), (true, 2, -6), (true, 3, -3), (true, 7, -1), (true, 8, 0), (true, 7, 1), (true, 3, 3), (true, 2, 6), (true, 0, 5), (true, -16, 0)],
    }),
    // 27
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 0), (true, 0, 32), (false, 0, -15), (true, 32, 0), (false, 0, 15), (true, 0, -32)],
    }),
    // 28
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 4, 32), (true, 24, 0), (false, -12, 0), (true, 0, -32), (false, -12, 0), (true, 24, 0)],
    }),
    // 29
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 12, 32), (true, 20, 0), (false, -8, 0), (true, 0, -22), (true, -1, -6), (true, -3, -3), (true, -5, -1), (true, -6, 0), (true, -5, 1), (true, -3, 3), (true, -1, 6)],
    }),
    // 2a
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 0), (true, 0, 32), (false, 0, -15), (true, 10, 0), (false, 20, 15), (true, -20, -15), (true, 22, -17)],
    }),
    // 2b
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 32), (true, 0, -32), (true, 32, 0)],
    }),
    // 2c
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 0), (true, 0, 32), (true, 16, -24), (true, 16, 24), (true, 0, -32)],
    }),
    // 2d
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 0), (true, 0, 32), (true, 32, -32), (true, 0, 32)],
    }),
    // 2e
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 12, 0), (true, -7, 1), (true, -3, 3), (true, -2, 6), (true, 0, 12), (true, 2, 6), (true, 3, 3), (true, 7, 1), (true, 8, 0), (true, 7, -1), (true, 3, -3), (true, 2, -6), (true, 0, -12), (true, -2, -6), (true, -3, -3), (true, -7, -1), (true, -8, 0)],
    }),
    // 2f
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 0), (true, 0, 32), (true, 25, 0), (true, 5, -2), (true, 2, -3), (true, 0, -8), (true, -2, -3), (true, -5, -2), (true, -25, 0)],
    }),
    // 30
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 12, 0), (true, -7, 1), (true, -3, 3), (true, -2, 6), (true, 0, 12), (true, 2, 6), (true, 3, 3), (true, 7, 1), (true, 8, 0), (true, 7, -1), (true, 3, -3), (true, 2, -6), (true, 0, -12), (true, -2, -6), (true, -3, -3), (true, -7, -1), (true, -8, 0), (false, 8, 13), (true, 12, -13)],
    }),
    // 31
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 0), (true, 0, 32), (true, 25, 0), (true, 5, -2), (true, 2, -3), (true, 0, -8), (true, -2, -3), (true, -5, -2), (true, -25, 0), (false, 25, 0), (true, 5, -2), (true, 2, -3), (true, 0, -9)],
    }),
    // 32
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 5), (true, 2, -3), (true, 5, -2), (true, 18, 0), (true, 5, 2), (true, 2, 3), (true, 0, 6), (true, -2, 3), (true, -5, 2), (true, -18, 1), (true, -5, 2), (true, -2, 3), (true, 0, 5), (true, 2, 3), (true, 5, 2), (true, 17, 0), (true, 5, -2), (true, 2, -3)],
    }),
    // 33
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 32), (true, 32, 0), (false, -16, 0), (true, 0, -32)],
    }),
    // 34
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 32), (true, 0, -23), (true, 2, -5), (true, 3, -3), (true, 7, -1), (true, 8, 0), (true, 7, 1), (true, 3, 3), (true, 2, 5), (true, 0, 23)],
    }),
    // 35
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 32), (true, 16, -32), (true, 16, 32)],
    }),
    // 36
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 32), (true, 4, -32), (true, 12, 24), (true, 12, -24), (true, 4, 32)],
    }),
    // 37
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 0), (true, 31, 32), (false, -30, 0), (true, 31, -32)],
    }),
    // 38
    Some(Glyph {
        center: (-15, -16),
        backspace: false,
        moves: &[(false, 15, 0), (true, 0, 14), (false, -16, 18), (true, 16, -18), (true, 16, 18)],
    }),
    // 39
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 1, 32), (true, 30, 0), (true, -31, -32), (true, 32, 0)],
    }),
    // 3a
    Some(Glyph {
        center: (-27, -16),
        backspace: false,
        moves: &[(false, 32, -4), (true, -10, 0), (true, 0, 40), (true, 10, 0)],
    }),
    // 3b
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 36), (true, 32, -40)],
    }),
    // 3c
    Some(Glyph {
        center: (-5, -16),
        backspace: false,
        moves: &[(false, 0, -4), (true, 10, 0), (true, 0, 40), (true, -10, 0)],
    }),
    // 3d
    Some(Glyph {
        center: (-14, -33),
        backspace: false,
        moves: &[(false, 4, 30), (true, 10, 6), (true, 10, -6)],
    }),
    // 3e
    Some(Glyph {
        center: (-24, 6),
        backspace: false,
        moves: &[(false, 0, -6), (true, 48, 0)],
    }),
    // 3f
    Some(Glyph {
        center: (-14, -34),
        backspace: false,
        moves: &[(false, 8, 38), (true, 12, -8)],
    }),
    // 40
    Some(Glyph {
        center: (-14, -12),
        backspace: false,
        moves: &[(false, 2, 22), (true, 2, 1), (true, 6, 1), (true, 8, 0), (true, 6, -1), (true, 3, -3), (true, 1, -4), (true, 0, -16), (false, 0, 10), (true, -3, 3), (true, -4, 1), (true, -14, 0), (true, -4, -1), (true, -3, -3), (true, 0, -6), (true, 3, -3), (true, 4, -1), (true, 14, 0), (true, 4, 1), (true, 3, 3)],
    }),
    // 41
    Some(Glyph {
        center: (-14, -16),
        backspace: false,
        moves: &[(false, 0, 0), (true, 0, 32), (false, 0, -14), (true, 3, 4), (true, 6, 2), (true, 10, 0), (true, 6, -2), (true, 3, -5), (true, 0, -10), (true, -3, -5), (true, -6, -2), (true, -10, 0), (true, -6, 2), (true, -3, 4)],
    }),
    // 42
    Some(Glyph {
        center: (-14, -12),
        backspace: false,
        moves: &[(false, 28, 18), (true, -3, 4), (true, -6, 2), (true, -10, 0), (true, -6, -2), (true, -3, -5), (true, 0, -10), (true, 3, -5), (true, 6, -2), (true, 10, 0), (true, 6, 2), (true, 3, 4)],
    }),
    // 43
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 28, 6), (true, -3, -4), (true, -6, -2), (true, -10, 0), (true, -6, 2), (true, -3, 5), (true, 0, 10), (true, 3, 5), (true, 6, 2), (true, 10, 0), (true, 6, -2), (true, 3, -4), (false, 0, 14), (true, 0, -32)],
    }),
    // 44
    Some(Glyph {
        center: (-14, -12),
        backspace: false,
        moves: &[(false, 0, 13), (true, 28, 0), (true, 0, 4), (true, -3, 5), (true, -6, 2), (true, -10, 0), (true, -6, -2), (true, -3, -5), (true, 0, -10), (true, 3, -5), (true, 6, -2), (true, 12, 0), (true, 6, 3)],
    }),
    // 45
    Some(Glyph {
        center: (-12, -16),
        backspace: false,
        moves: &[(false, 12, 0), (true, 0, 28), (true, 2, 3), (true, 5, 1), (true, 5, 0), (false, -19, -12), (true, 19, 0)],
    }),
    // 46
    Some(Glyph {
        center: (-14, -8),
        backspace: false,
        moves: &[(false, 1, -6), (true, 6, -2), (true, 12, 0), (true, 6, 2), (true, 3, 4), (true, 0, 26), (false, 0, -6), (true, -3, 4), (true, -6, 2), (true, -10, 0), (true, -6, -2), (true, -3, -5), (true, 0, -8), (true, 3, -5), (true, 6, -2), (true, 10, 0), (true, 6, 2), (true, 3, 5)],
    }),
    // 47
    Some(Glyph {
        center: (-14, -16),
        backspace: false,
        moves: &[(false, 0, 0), (true, 0, 32), (false, 0, -14), (true, 3, 4), (true, 6, 2), (true, 10, 0), (true, 6, -2), (true, 3, -4), (true, 0, -18)],
    }),
    // 48
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 14, 32), (true, 0, -2), (false, -8, -8), (true, 12, 0), (true, 0, -22), (false, -12, 0), (true, 20, 0)],
    }),
    // 49
    Some(Glyph {
        center: (-9, -12),
        backspace: false,
        moves: &[(false, 6, -8), (true, 5, 0), (true, 5, 1), (true, 2, 3), (true, 0, 26), (true, -12, 0), (false, 8, 8), (true, 0, 2)],
    }),
    // 4a
    Some(Glyph {
        center: (-14, -16),
        backspace: false,
        moves: &[(false, 0, 0), (true, 0, 32), (false, 26, -8), (true, -20, -11), (true, -6, 0), (false, 6, 0), (true, 22, -13)],
    }),
    // 4b
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 6, 32), (true, 12, 0), (true, 0, -32), (false, -12, 0), (true, 20, 0)],
    }),
    // 4c
    Some(Glyph {
        center: (-16, -12),
        backspace: false,
        moves: &[(false, 0, 0), (true, 0, 24), (false, 0, -6), (true, 2, 4), (true, 4, 2), (true, 4, 0), (true, 4, -2), (true, 2, -4), (true, 0, -18), (false, 0, 18), (true, 2, 4), (true, 4, 2), (true, 4, 0), (true, 4, -2), (true, 2, -4), (true, 0, -18)],
    }),
    // 4d
    Some(Glyph {
        center: (-14, -12),
        backspace: false,
        moves: &[(false, 0, 0), (true, 0, 24), (false, 0, -6), (true, 3, 4), (true, 6, 2), (true, 10, 0), (true, 6, -2), (true, 3, -4), (true, 0, -18)],
    }),
    // 4e
    Some(Glyph {
        center: (-14, -12),
        backspace: false,
        moves: &[(false, 9, 0), (true, -6, 2), (true, -3, 5), (true, 0, 10), (true, 3, 5), (true, 6, 2), (true, 10, 0), (true, 6, -2), (true, 3, -5), (true, 0, -10), (true, -3, -5), (true, -6, -2), (true, -10, 0)],
    }),
    // 4f
    Some(Glyph {
        center: (-14, -8),
        backspace: false,
        moves: &[(false, 0, -8), (true, 0, 32), (false, 0, -6), (true, 3, 4), (true, 6, 2), (true, 10, 0), (true, 6, -2), (true, 3, -5), (true, 0, -10), (true, -3, -5), (true, -6, -2), (true, -10, 0), (true, -6, 2), (true, -3, 4)],
    }),
    // 50
    Some(Glyph {
        center: (-14, -8),
        backspace: false,
        moves: &[(false, 28, 18), (true, -3, 4), (true, -6, 2), (true, -10, 0), (true, -6, -2), (true, -3, -5), (true, 0, -10), (true, 3, -5), (true, 6, -2), (true, 10, 0), (true, 6, 2), (true, 3, 4), (false, 0, 18), (true, 0, -32)],
    }),
    // 51
    Some(Glyph {
        center: (-14, -12),
        backspace: false,
        moves: &[(false, 0, 0), (true, 0, 24), (false, 0, -8), (true, 4, 6), (true, 6, 2), (true, 9, 0), (true, 6, -2), (true, 3, -5)],
    }),
    // 52
    Some(Glyph {
        center: (-14, -12),
        backspace: false,
        moves: &[(false, 0, 4), (true, 3, -3), (true, 6, -1), (true, 10, 0), (true, 6, 1), (true, 3, 3), (true, 0, 5), (true, -3, 3), (true, -6, 1), (true, -10, 0), (true, -6, 1), (true, -3, 2), (true, 0, 5), (true, 3, 2), (true, 6, 1), (true, 10, 0), (true, 6, -1), (true, 3, -2)],
    }),
    // 53
    Some(Glyph {
        center: (-14, -15),
        backspace: false,
        moves: &[(false, 0, 22), (true, 24, 0), (false, -16, 10), (true, 0, -28), (true, 3, -3), (true, 4, -1), (true, 9, 0), (true, 4, 2)],
    }),
    // 54
    Some(Glyph {
        center: (-14, -12),
        backspace: false,
        moves: &[(false, 0, 24), (true, 0, -18), (true, 3, -4), (true, 6, -2), (true, 10, 0), (true, 6, 2), (true, 3, 4), (false, 0, 18), (true, 0, -24)],
    }),
    // 55
    Some(Glyph {
        center: (-14, -12),
        backspace: false,
        moves: &[(false, 0, 24), (true, 14, -24), (true, 14, 24)],
    }),
    // 56
    Some(Glyph {
        center: (-16, -12),
        backspace: false,
        moves: &[(false, 0, 24), (true, 5, -24), (true, 11, 18), (true, 11, -18), (true, 5, 24)],
    }),
    // 57
    Some(Glyph {
        center: (-14, -12),
        backspace: false,
        moves: &[(false, 0, 0), (true, 27, 24), (false, -26, 0), (true, 27, -24)],
    }),
    // 58
    Some(Glyph {
        center: (-14, -8),
        backspace: false,
        moves: &[(false, 5, -8), (true, 4, 0), (true, 4, 3), (true, 3, 5), (true, 12, 24), (false, -28, 0), (true, 16, -24)],
    }),
    // 59
    Some(Glyph {
        center: (-14, -12),
        backspace: false,
        moves: &[(false, 1, 24), (true, 26, 0), (true, -27, -24), (true, 28, 0)],
    }),
    // 5a
    Some(Glyph {
        center: (-26, -16),
        backspace: false,
        moves: &[(false, 32, 36), (true, -3, 0), (true, -2, -1), (true, -1, -2), (true, 0, -12), (true, -1, -2), (true, -2, -2), (true, -3, -1), (true, 3, -1), (true, 2, -2), (true, 1, -2), (true, 0, -12), (true, 1, -2), (true, 2, -1), (true, 3, 0)],
    }),
    // 5b
    Some(Glyph {
        center: (0, -16),
        backspace: false,
        moves: &[(false, 0, -4), (true, 0, 40)],
    }),
    // 5c
    Some(Glyph {
        center: (-6, -16),
        backspace: false,
        moves: &[(false, 0, 36), (true, 3, 0), (true, 2, -1), (true, 1, -2), (true, 0, -12), (true, 1, -2), (true, 2, -2), (true, 3, -1), (true, -3, -1), (true, -2, -2), (true, -1, -2), (true, 0, -12), (true, -1, -2), (true, -2, -1), (true, -3, 0)],
    }),
    // 5d
    Some(Glyph {
        center: (-14, -32),
        backspace: false,
        moves: &[(false, 0, 30), (true, 4, 4), (true, 3, 1), (true, 3, 0), (true, 2, -1), (true, 4, -3), (true, 2, -1), (true, 3, 0), (true, 3, 1), (true, 4, 4)],
    }),
    // 5e
    None,
    // 5f
    Some(Glyph {
        center: (-16, -34),
        backspace: false,
        moves: &[(false, 16, 38), (true, 0, -8)],
    }),
    // 60
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 16), (true, 8, 0), (true, 8, -16), (true, 8, 32), (true, 8, 0)],
    }),
    // 61
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 16, 0), (true, 0, 32), (false, -16, -12), (true, 16, 12), (true, 16, -12)],
    }),
    // 62
    Some(Glyph {
        center: (24, 6),
        backspace: true,
        moves: &[(false, 0, -6), (true, -48, 0)],
    }),
    // 63
    Some(Glyph {
        center: (32, -34),
        backspace: true,
        moves: &[(false, -26, 30), (true, -12, 8)],
    }),
    // 64
    Some(Glyph {
        center: (-16, -13),
        backspace: false,
        moves: &[(false, 0, 18), (true, 5, 5), (true, 2, 1), (true, 3, 0), (true, 12, -4), (true, 3, 0), (true, 2, 1), (true, 5, 5), (false, -24, -2), (true, 0, -24), (false, 16, 20), (true, 0, -20)],
    }),
    // 65
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 0), (true, 0, 32), (false, 0, -16), (true, 32, 0)],
    }),
    // 66
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 16), (true, 32, 0), (false, -9, 3), (true, 9, -3), (true, -9, -3)],
    }),
    // 67
    Some(Glyph {
        center: (34, -32),
        backspace: true,
        moves: &[(false, -20, 35), (true, -4, -4), (true, -3, -1), (true, -3, 0), (true, -2, 1), (true, -4, 3), (true, -2, 1), (true, -3, 0), (true, -3, -1), (true, -4, -4)],
    }),
    // 68
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 8, 20), (true, 16, 0), (false, 8, 8), (true, -3, 3), (true, -3, 1), (true, -4, 0), (true, -3, -1), (true, -2, -2), (true, -1, -4), (true, 0, -17), (true, -1, -4), (true, -3, -3), (true, -3, -1), (true, -4, 0), (true, -3, 1), (true, -2, 2), (true, 0, 2), (true, 2, 2), (true, 3, 1), (true, 4, 0), (true, 3, -1), (true, 8, -6), (true, 3, -1), (true, 4, 0), (true, 4, 2), (true, 1, 2)],
    }),
    // 69
    Some(Glyph {
        center: (34, -34),
        backspace: true,
        moves: &[(false, -28, 38), (true, -12, -8)],
    }),
    // 6a
    Some(Glyph {
        center: (-14, -8),
        backspace: false,
        moves: &[(false, 13, -8), (true, 3, 3), (true, -4, 5), (false, 16, 6), (true, -3, -4), (true, -6, -2), (true, -10, 0), (true, -6, 2), (true, -3, 5), (true, 0, 10), (true, 3, 5), (true, 6, 2), (true, 10, 0), (true, 6, -2), (true, 3, -4)],
    }),
    // 6b
    Some(Glyph {
        center: (34, -33),
        backspace: true,
        moves: &[(false, -24, 30), (true, -10, 6), (true, -10, -6)],
    }),
    // 6c
    Some(Glyph {
        center: (32, -39),
        backspace: true,
        moves: &[(false, -24, 38), (true, 0, 2), (true, -3, 0), (true, 0, -2), (true, 3, 0), (false, -13, 2), (true, -3, 0), (true, 0, -2), (true, 3, 0), (true, 0, 2)],
    }),
    // 6d
    Some(Glyph {
        center: (32, -41),
        backspace: true,
        moves: &[(false, -27, 40), (true, 0, 3), (true, -3, 2), (true, -4, 0), (true, -3, -2), (true, 0, -3), (true, 3, -2), (true, 4, 0), (true, 3, 2)],
    }),
    // 6e
    Some(Glyph {
        center: (34, -31),
        backspace: true,
        moves: &[(false, -26, 30), (true, 0, 2), (true, -3, 0), (true, 0, -2), (true, 3, 0), (false, -13, 2), (true, -3, 0), (true, 0, -2), (true, 3, 0), (true, 0, 2)],
    }),
    // 6f
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 0), (true, 32, 32), (false, -5, -1), (true, -7, 1), (true, -8, 0), (true, -7, -1), (true, -3, -3), (true, -2, -6), (true, 0, -12), (true, 2, -6), (true, 3, -3), (true, 7, -1), (true, 8, 0), (true, 7, 1), (true, 3, 3), (true, 2, 6), (true, 0, 12), (true, -2, 6), (true, -3, 3)],
    }),
    // 70
    Some(Glyph {
        center: (-16, -16),
        backspace: false,
        moves: &[(false, 0, 0), (true, 14, 32), (true, 18, 0), (false, -15, 0), (true, 0, -32), (true, 15, 0), (false, -25, 16), (true, 25, 0)],
    }),
    // 71
    Some(Glyph {
        center: (-14, -12),
        backspace: false,
        moves: &[(false, 0, 0), (true, 28, 24), (false, -9, 0), (true, -10, 0), (true, -6, -2), (true, -3, -5), (true, 0, -10), (true, 3, -5), (true, 6, -2), (true, 10, 0), (true, 6, 2), (true, 3, 5), (true, 0, 10), (true, -3, 5), (true, -6, 2)],
    }),
    // 72
    Some(Glyph {
        center: (-16, -12),
        backspace: false,
        moves: &[(false, 16, 4), (true, -2, -3), (true, -3, -1), (true, -6, 0), (true, -3, 1), (true, -2, 3), (true, 0, 4), (true, 3, 3), (true, 6, 2), (true, 7, 1), (true, 16, 0), (true, 0, 6), (true, -2, 3), (true, -3, 1), (true, -6, 0), (true, -3, -1), (true, -2, -3), (false, -16, 2), (true, 4, 2), (true, 7, 0), (true, 3, -1), (true, 2, -3), (true, 0, -16), (true, 2, -3), (true, 3, -1), (true, 7, 0), (true, 4, 2)],
    }),
    // 73
    Some(Glyph {
        center: (34, -33),
        backspace: true,
        moves: &[(false, -29, 32), (true, 0, 3), (true, -3, 2), (true, -4, 0), (true, -3, -2), (true, 0, -3), (true, 3, -2), (true, 4, 0), (true, 3, 2)],
    }),
    // 74
    Some(Glyph {
        center: (-16, -8),
        backspace: false,
        moves: &[(false, 16, 24), (true, 0, -2), (true, 3, 0), (true, 0, 2), (true, -3, 0), (false, 2, -10), (true, -1, -3), (true, -2, -2), (true, -8, -1), (true, -5, -2), (true, -2, -3), (true, 0, -6), (true, 2, -3), (true, 5, -2), (true, 18, 0), (true, 5, 2), (true, 2, 3)],
    }),
    // 75
    Some(Glyph {
        center: (-31, -8),
        backspace: false,
        moves: &[(false, 31, -8), (true, 0, 21), (false, -1, 9), (true, 0, 2), (true, 2, 0), (true, 0, -2), (true, -2, 0)],
    }),
    // 76
    Some(Glyph {
        center: (56, -42),
        backspace: true,
        moves: &[(false, -16, 46), (true, -17, -7), (true, -4, -1), (true, -6, 0), (true, -4, 1), (true, -18, 6), (true, -4, 1), (true, -6, 0), (true, -4, -1), (true, -17, -7)],
    }),
    // 77
    Some(Glyph {
        center: (32, -41),
        backspace: true,
        moves: &[(false, -16, 44), (true, -5, -5), (true, -2, -1), (true, -3, 0), (true, -3, 1), (true, -6, 4), (true, -3, 1), (true, -3, 0), (true, -2, -1), (true, -5, -5)],
    }),
    // 78
    Some(Glyph {
        center: (56, -34),
        backspace: true,
        moves: &[(false, -16, 38), (true, -17, -7), (true, -4, -1), (true, -6, 0), (true, -4, 1), (true, -18, 6), (true, -4, 1), (true, -6, 0), (true, -4, -1), (true, -17, -7)],
    }),
];

static XLATE_1: &[(u8, u8)] = &[(0x27, 0x5f), (0x5c, 0x60), (0x5e, 0x61), (0x5f, 0x62), (0x60, 0x63), (0x7b, 0x64), (0x7c, 0x65), (0x7d, 0x66), (0x7e, 0x67)];
static XLATE_2: &[(u8, u8)] = &[(0x23, 0x68), (0x27, 0x69), (0x5c, 0x6a), (0x5e, 0x6b), (0x5f, 0x62), (0x60, 0x63), (0x7b, 0x6c), (0x7c, 0x6d), (0x7d, 0x6e), (0x7e, 0x5f)];
static XLATE_3: &[(u8, u8)] = &[(0x23, 0x68), (0x5b, 0x6f), (0x5c, 0x70), (0x5d, 0x71), (0x5e, 0x72), (0x5f, 0x62), (0x7b, 0x6c), (0x7c, 0x6d), (0x7d, 0x6e), (0x7e, 0x73)];
static XLATE_4: &[(u8, u8)] = &[(0x23, 0x74), (0x27, 0x69), (0x5c, 0x75), (0x5e, 0x6b), (0x5f, 0x62), (0x7b, 0x76), (0x7c, 0x77), (0x7d, 0x78), (0x7e, 0x67)];

/// Map an input character to a glyph code through the selected set.
pub fn translate_code(charset: u8, ch: u8) -> Option<u8> {
    let table: &[(u8, u8)] = match charset {
        1 => XLATE_1,
        2 => XLATE_2,
        3 => XLATE_3,
        4 => XLATE_4,
        _ => &[],
    };
    if let Some(&(_, code)) = table.iter().find(|&&(c, _)| c == ch) {
        return Some(code);
    }
    if (0x21..=0x7e).contains(&ch) {
        Some(ch - 0x21)
    } else {
        None
    }
}

pub fn glyph(code: u8) -> Option<&'static Glyph> {
    FONT.get(usize::from(code)).and_then(|g| g.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_maps_to_base_set() {
        assert_eq!(translate_code(0, b'A'), Some(b'A' - 0x21));
        assert_eq!(translate_code(0, 0x20), None);
        assert_eq!(translate_code(0, 0x7f), None);
    }

    #[test]
    fn test_alternate_set_overrides() {
        // Charset 1 redirects the apostrophe
        assert_eq!(translate_code(1, 0x27), Some(0x5f));
        // but leaves plain letters alone
        assert_eq!(translate_code(1, b'Z'), Some(b'Z' - 0x21));
    }

    #[test]
    fn test_glyph_table_shape() {
        // 0x5e is the only hole in the table
        assert!(glyph(0x5e).is_none());
        let a = glyph(b'A' - 0x21).unwrap();
        assert!(!a.moves.is_empty());
        // Auto-backspace glyphs exist in the accented range
        assert!(glyph(0x62).unwrap().backspace);
    }
}
