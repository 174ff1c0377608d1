// permission.rs - The positional permission mini-language.
//
// A permission string has three or four positions:
//
//   1  read    (list, for directories)        r - *
//   2  write   (create files, for directories) w - *
//   3  execute (access files, for directories) x - * X D
//   4  setuid / setgid / sticky               s - * S Z D   (owner, owning group, other only)
//
// Several symbols mean different things for files and directories. All of
// that branching lives in `Symbol::effects`, a two-column table, so the rest
// of the crate never looks at the object type.

use std::fmt;

use crate::error::PolicyError;
use crate::state::{ObjectKind, Perms};

/// One position of a permission string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    Read,
    Write,
    Execute,
    Special,
}

impl Position {
    pub const ALL: [Position; 4] = [
        Position::Read,
        Position::Write,
        Position::Execute,
        Position::Special,
    ];

    /// The letter that means "set" at this position.
    fn set_char(self) -> char {
        match self {
            Position::Read => 'r',
            Position::Write => 'w',
            Position::Execute => 'x',
            Position::Special => 's',
        }
    }
}

/// Which subjects a permission string belongs to.
///
/// Only base subjects (owner, owning group, other) carry a special bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectClass {
    Base,
    Named,
}

/// The intent encoded by a single permission character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    Set,
    Clear,
    NoChange,
    /// `X`: set for directories, copy the owner's execute bit for files.
    DirSetFileOwner,
    /// `D`: set for directories, clear for files.
    DirSetFileClear,
    /// `S`: set for directories, unchanged for files.
    DirSetFileKeep,
    /// `Z`: clear for directories, unchanged for files.
    DirClearFileKeep,
}

/// What a symbol does to a bit once the object type is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Set,
    Clear,
    Keep,
    CopyOwner,
}

impl Symbol {
    /// `[file, directory]` effect of each symbol.
    pub fn effects(self) -> [Effect; 2] {
        use Effect::*;
        match self {
            Symbol::Set => [Set, Set],
            Symbol::Clear => [Clear, Clear],
            Symbol::NoChange => [Keep, Keep],
            Symbol::DirSetFileOwner => [CopyOwner, Set],
            Symbol::DirSetFileClear => [Clear, Set],
            Symbol::DirSetFileKeep => [Keep, Set],
            Symbol::DirClearFileKeep => [Keep, Clear],
        }
    }

    pub fn effect(self, kind: ObjectKind) -> Effect {
        self.effects()[usize::from(kind.is_dir())]
    }

    /// Parse one character at a position.
    pub fn parse(c: char, position: Position, class: SubjectClass) -> Result<Self, PolicyError> {
        if position == Position::Special && class == SubjectClass::Named {
            return Err(PolicyError::grammar(
                "a fourth permission position is only allowed for owner, owning group and other",
            ));
        }
        let symbol = match (position, c) {
            (_, '-') => Symbol::Clear,
            (_, '*') => Symbol::NoChange,
            (p, c) if c == p.set_char() => Symbol::Set,
            (Position::Execute, 'X') => Symbol::DirSetFileOwner,
            (Position::Execute | Position::Special, 'D') => Symbol::DirSetFileClear,
            (Position::Special, 'S') => Symbol::DirSetFileKeep,
            (Position::Special, 'Z') => Symbol::DirClearFileKeep,
            (p, c) => {
                return Err(PolicyError::grammar(format!(
                    "'{}' is not a legal symbol at position {}, expected one of {}",
                    c,
                    p.number(),
                    legal_symbols(p)
                )))
            }
        };
        Ok(symbol)
    }

    /// The character this symbol is written as at `position`.
    pub fn to_char(self, position: Position) -> char {
        match self {
            Symbol::Set => position.set_char(),
            Symbol::Clear => '-',
            Symbol::NoChange => '*',
            Symbol::DirSetFileOwner => 'X',
            Symbol::DirSetFileClear => 'D',
            Symbol::DirSetFileKeep => 'S',
            Symbol::DirClearFileKeep => 'Z',
        }
    }
}

impl Position {
    fn number(self) -> usize {
        match self {
            Position::Read => 1,
            Position::Write => 2,
            Position::Execute => 3,
            Position::Special => 4,
        }
    }
}

fn legal_symbols(position: Position) -> &'static str {
    match position {
        Position::Read => "r - *",
        Position::Write => "w - *",
        Position::Execute => "x - * X D",
        Position::Special => "s - * S Z D",
    }
}

/// Resolve one symbol to a concrete bit.
///
/// `current` is the subject's current bit at this position; `owner_execute` is
/// the owner's current execute bit, which `X` copies on files.
pub fn resolve(symbol: Symbol, kind: ObjectKind, current: bool, owner_execute: bool) -> bool {
    match symbol.effect(kind) {
        Effect::Set => true,
        Effect::Clear => false,
        Effect::Keep => current,
        Effect::CopyOwner => owner_execute,
    }
}

/// A parsed permission string: three rwx symbols and an optional special symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PermissionIntent {
    pub bits: [Symbol; 3],
    pub special: Option<Symbol>,
}

impl PermissionIntent {
    /// Parse a permission string of exactly `width` (3 or 4) characters.
    pub fn parse(text: &str, class: SubjectClass, width: usize) -> Result<Self, PolicyError> {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() != width {
            return Err(PolicyError::grammar(format!(
                "permission '{}' must have {} symbols, found {}",
                text,
                width,
                chars.len()
            )));
        }
        let mut bits = [Symbol::NoChange; 3];
        for (i, slot) in bits.iter_mut().enumerate() {
            *slot = Symbol::parse(chars[i], Position::ALL[i], class)?;
        }
        let special = match chars.get(3) {
            Some(&c) => Some(Symbol::parse(c, Position::Special, class)?),
            None => None,
        };
        Ok(Self { bits, special })
    }

    /// Resolve every position against the object's type and current bits.
    pub fn resolve(&self, kind: ObjectKind, current: Perms, owner_execute: bool) -> Perms {
        let mut perms = current;
        for (i, symbol) in self.bits.iter().enumerate() {
            perms = perms.with_bit(i, resolve(*symbol, kind, current.bit(i), owner_execute));
        }
        perms
    }

    /// Resolve the special position, if present. `None` leaves the bit alone.
    pub fn resolve_special(&self, kind: ObjectKind, current: bool) -> Option<bool> {
        self.special
            .map(|symbol| resolve(symbol, kind, current, false))
    }
}

impl fmt::Display for PermissionIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, symbol) in self.bits.iter().enumerate() {
            write!(f, "{}", symbol.to_char(Position::ALL[i]))?;
        }
        if let Some(symbol) = self.special {
            write!(f, "{}", symbol.to_char(Position::Special))?;
        }
        Ok(())
    }
}
