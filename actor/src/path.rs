// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor path
//!
//! The `path` module provides the `ActorPath` type, a hierarchical address of an actor in the
//! actor system, plus the naming rules shared by every context: validation of user supplied
//! names and generation of names for anonymous actors.
//!

use crate::Error;

use serde::{Deserialize, Serialize};

use std::cmp::Ordering;
use std::fmt::Formatter;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Path separator.
pub const SEPARATOR: char = '/';

/// Marker that prefixes every generated actor name.
pub const GENERATED_MARKER: char = '$';

/// Segment of the user guardian.
pub const USER_SEGMENT: &str = "user";

/// Segment of the system guardian.
pub const SYSTEM_SEGMENT: &str = "sys";

/// Segment of the dead-letter actor, below the system guardian.
pub const DEAD_LETTERS_SEGMENT: &str = "deadLetters";

/// First value handed out by the name counter.
const NAME_COUNTER_SEED: u64 = 10_000;

/// Process-wide counter backing generated names.
static NAME_COUNTER: AtomicU64 = AtomicU64::new(NAME_COUNTER_SEED);

/// Hierarchical actor path providing unique addressing for actors within the actor system.
///
/// `ActorPath` represents the location of an actor within the supervision tree, similar to a
/// filesystem path. The root of the tree is a distinguished sentinel (no segments) rendered as
/// `/`. Every other path is its parent plus one segment; a child of the root is rendered
/// without an extra separator (`/user`, not `//user`).
///
/// Paths are immutable. Deriving a child path always builds a new value.
///
/// # Path Format
///
/// - Root: `/`
/// - User guardian: `/user`
/// - User actor: `/user/manager/worker`
/// - System namespace: `/sys/deadLetters`
/// - Generated names start with `$`: `/user/$QSc`
///
/// ```ignore
/// use actor::ActorPath;
///
/// let worker = ActorPath::root_path() / "user" / "manager" / "worker";
/// assert_eq!(worker.to_string(), "/user/manager/worker");
/// assert_eq!(worker.name(), "worker");
/// assert_eq!(worker.parent().to_string(), "/user/manager");
/// ```
///
#[derive(
    Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ActorPath(Vec<String>);

impl ActorPath {
    /// The root sentinel path, rendered as `/`.
    pub fn root_path() -> Self {
        ActorPath(Vec::new())
    }

    /// Derives the path of a child named `name`.
    ///
    /// The segment is taken verbatim; names are validated by the creating context before a
    /// path is ever derived from them.
    pub fn with_name(&self, name: &str) -> Self {
        let mut tokens = self.0.clone();
        tokens.push(name.to_owned());
        ActorPath(tokens)
    }

    /// Top-level ancestor of this path (`/user` for `/user/a/b`).
    pub fn root(&self) -> Self {
        if self.0.len() == 1 {
            self.clone()
        } else if !self.0.is_empty() {
            ActorPath(self.0.iter().take(1).cloned().collect())
        } else {
            ActorPath(Vec::new())
        }
    }

    /// Enclosing path. The parent of a top-level path and of the root is the root.
    pub fn parent(&self) -> Self {
        if self.0.len() > 1 {
            let mut tokens = self.0.clone();
            tokens.truncate(tokens.len() - 1);
            ActorPath(tokens)
        } else {
            ActorPath(Vec::new())
        }
    }

    /// Last segment of the path, empty for the root.
    pub fn name(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("")
    }

    /// Segments of the path, outermost first.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Full slash-delimited value of the path.
    pub fn value(&self) -> String {
        self.to_string()
    }

    /// Number of segments.
    pub fn level(&self) -> usize {
        self.0.len()
    }

    /// True for the root sentinel.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `other` lives strictly below this path.
    pub fn is_ancestor_of(&self, other: &ActorPath) -> bool {
        other.0.len() > self.0.len() && other.0.starts_with(&self.0)
    }

    /// True when this path lives strictly below `other`.
    pub fn is_descendant_of(&self, other: &ActorPath) -> bool {
        other.is_ancestor_of(self)
    }

    /// True when `other` is a direct child of this path.
    pub fn is_parent_of(&self, other: &ActorPath) -> bool {
        !other.is_root() && *self == other.parent()
    }

    /// True when this path is a direct child of `other`.
    pub fn is_child_of(&self, other: &ActorPath) -> bool {
        other.is_parent_of(self)
    }

    /// True for paths of the `/user` namespace, the guardian included.
    pub fn is_user(&self) -> bool {
        self.0.first().map(String::as_str) == Some(USER_SEGMENT)
    }
}

impl From<&str> for ActorPath {
    fn from(str: &str) -> Self {
        let tokens: Vec<String> = str
            .split(SEPARATOR)
            .filter(|x| !x.trim().is_empty())
            .map(|s| s.to_string())
            .collect();
        ActorPath(tokens)
    }
}

impl From<String> for ActorPath {
    fn from(string: String) -> Self {
        ActorPath::from(string.as_str())
    }
}

impl From<&String> for ActorPath {
    fn from(string: &String) -> Self {
        ActorPath::from(string.as_str())
    }
}

impl std::ops::Div<&str> for ActorPath {
    type Output = ActorPath;

    fn div(self, rhs: &str) -> Self::Output {
        let mut keys = self.0;
        let mut tokens: Vec<String> = rhs
            .split(SEPARATOR)
            .filter(|x| !x.trim().is_empty())
            .map(|s| s.to_string())
            .collect();

        keys.append(&mut tokens);
        ActorPath(keys)
    }
}

impl std::fmt::Display for ActorPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.level().cmp(&1) {
            Ordering::Less => write!(f, "/"),
            Ordering::Equal => write!(f, "/{}", self.0[0]),
            Ordering::Greater => write!(f, "/{}", self.0.join("/")),
        }
    }
}

impl std::fmt::Debug for ActorPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

/// Validates a user supplied actor name and returns its trimmed form.
///
/// A name is rejected when it is blank, contains the path separator, or contains the
/// generated-name marker anywhere past its first character. Uniqueness among siblings is
/// checked by the creating context, which owns the sibling list.
pub fn validate_name(name: &str) -> Result<String, Error> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidName(
            name.to_owned(),
            "the actor name is required".to_owned(),
        ));
    }
    if trimmed.contains(SEPARATOR)
        || trimmed.chars().skip(1).any(|c| c == GENERATED_MARKER)
    {
        return Err(Error::InvalidName(
            name.to_owned(),
            "the actor name has invalid character(s)".to_owned(),
        ));
    }
    Ok(trimmed.to_owned())
}

/// Makes sure the name counter starts at its seed. Called when a system is created; the
/// counter is never reset, so names stay unique for the lifetime of the process.
pub(crate) fn init_name_counter() {
    NAME_COUNTER.fetch_max(NAME_COUNTER_SEED, AtomicOrdering::SeqCst);
}

/// Generates a fresh name for an anonymous actor.
pub fn generate_name() -> String {
    let value = NAME_COUNTER.fetch_add(1, AtomicOrdering::SeqCst) + 1;
    format!("{}{}", GENERATED_MARKER, encode_token(value))
}

/// URL-safe alphabet, so tokens never contain the path separator.
const TOKEN_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Renders the significant little-endian bytes of `value` as an unpadded base64 token.
fn encode_token(value: u64) -> String {
    let bytes = value.to_le_bytes();
    let significant = bytes
        .iter()
        .rposition(|b| *b != 0)
        .map(|last| last + 1)
        .unwrap_or(1);

    let mut token = String::new();
    for chunk in bytes[..significant].chunks(3) {
        let mut buffer = [0u8; 3];
        buffer[..chunk.len()].copy_from_slice(chunk);
        let group = (u32::from(buffer[0]) << 16)
            | (u32::from(buffer[1]) << 8)
            | u32::from(buffer[2]);
        let chars = chunk.len() + 1;
        for index in 0..chars {
            let shift = 18 - 6 * index;
            let sextet = ((group >> shift) & 0x3f) as usize;
            token.push(char::from(TOKEN_ALPHABET[sextet]));
        }
    }
    token
}
