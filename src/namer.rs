use std::fmt::Display;

use rust_decimal::Decimal;

/// Price movement since the previous sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Flat,
    /// No previous sample to compare against.
    Initial,
}

impl Direction {
    pub fn between(current: Decimal, previous: Option<Decimal>) -> Self {
        match previous {
            None => Self::Initial,
            Some(prev) if current > prev => Self::Up,
            Some(prev) if current < prev => Self::Down,
            Some(_) => Self::Flat,
        }
    }

    pub fn glyph(self) -> &'static str {
        match self {
            Self::Up => "🟢⬈",
            Self::Down => "🔴⬊",
            Self::Flat => "⚪",
            Self::Initial => "🟡",
        }
    }

    pub fn colour(self) -> &'static str {
        match self {
            Self::Up => "green",
            Self::Down => "red",
            Self::Flat => "white",
            Self::Initial => "yellow (first load)",
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.colour())
    }
}

/// Channel name for `current`, prefixed with the direction glyph.
pub fn compute_label(current: Decimal, previous: Option<Decimal>) -> (String, Direction) {
    let direction = Direction::between(current, previous);
    (format!("{} BTC: $ {current:.2}", direction.glyph()), direction)
}
