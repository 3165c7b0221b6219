macro_rules! key_table {
    ($($name:ident),* $(,)?) => {
        /// Logical key, in fixed table order.
        ///
        /// Left and right modifiers are distinct keys.
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
        pub enum Key {
            $($name),*
        }

        impl Key {
            /// Every key, in table order. `Key::ALL[k.index()] == k`.
            pub const ALL: &'static [Key] = &[$(Key::$name),*];
        }
    };
}

key_table! {
    Space,
    Apostrophe,
    Comma,
    Minus,
    Period,
    Slash,
    Digit0, Digit1, Digit2, Digit3, Digit4,
    Digit5, Digit6, Digit7, Digit8, Digit9,
    Semicolon,
    Equal,
    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
    LeftBracket,
    Backslash,
    RightBracket,
    GraveAccent,
    Escape,
    Enter,
    Tab,
    Backspace,
    Insert,
    Delete,
    Right,
    Left,
    Down,
    Up,
    PageUp,
    PageDown,
    Home,
    End,
    CapsLock,
    ScrollLock,
    NumLock,
    PrintScreen,
    Pause,
    F1, F2, F3, F4, F5, F6,
    F7, F8, F9, F10, F11, F12,
    Kp0, Kp1, Kp2, Kp3, Kp4,
    Kp5, Kp6, Kp7, Kp8, Kp9,
    KpDecimal,
    KpDivide,
    KpMultiply,
    KpSubtract,
    KpAdd,
    KpEnter,
    KpEqual,
    LeftShift,
    LeftControl,
    LeftAlt,
    LeftSuper,
    RightShift,
    RightControl,
    RightAlt,
    RightSuper,
    Menu,
}

impl Key {
    /// Number of keys in the table.
    pub const COUNT: usize = Self::ALL.len();

    /// Position of the key in `Key::ALL`.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Per-frame state of a key.
///
/// `Pressed` and `Released` last exactly one frame; `Down` and `Up` persist.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum KeyState {
    #[default]
    Up,
    Pressed,
    Down,
    Released,
}

impl KeyState {
    /// State after one frame whose physical sample is `pressed`.
    #[inline]
    pub const fn next(self, pressed: bool) -> Self {
        match (self, pressed) {
            (KeyState::Up | KeyState::Released, true) => KeyState::Pressed,
            (KeyState::Pressed | KeyState::Down, true) => KeyState::Down,
            (KeyState::Pressed | KeyState::Down, false) => KeyState::Released,
            (KeyState::Up | KeyState::Released, false) => KeyState::Up,
        }
    }

    /// True for `Pressed` and `Down`.
    #[inline]
    pub const fn is_held(self) -> bool {
        matches!(self, KeyState::Pressed | KeyState::Down)
    }
}

/// Edge-triggered state of every key.
#[derive(Debug, Clone)]
pub struct Keyboard {
    states: [KeyState; Key::COUNT],
}

impl Keyboard {
    pub fn new() -> Self {
        Self {
            states: [KeyState::Up; Key::COUNT],
        }
    }

    /// Advances every key by one frame.
    pub fn update(&mut self, pressed: &[bool; Key::COUNT]) {
        for (state, &down) in self.states.iter_mut().zip(pressed) {
            *state = state.next(down);
        }
    }

    #[inline]
    pub fn state(&self, key: Key) -> KeyState {
        self.states[key.index()]
    }

    /// Forgets every key (all `Up`).
    pub fn clear(&mut self) {
        self.states = [KeyState::Up; Key::COUNT];
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}
