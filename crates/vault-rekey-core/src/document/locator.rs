//! Addresses of encrypted scalars inside a YAML document.
//!
//! An address is the path of mapping keys and sequence positions leading
//! from the document root to one `!vault` scalar. Addresses recorded at
//! load time drive both decryption and the later re-encryption pass, so
//! resolving one must keep working after the node it points at has been
//! swapped out.

use std::fmt;

use serde_yaml::Value;

use super::scalar::EncryptedScalar;

/// One step down into a YAML document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Step {
    /// Mapping entry under a string key.
    Key(String),
    /// Sequence element by position.
    Index(usize),
}

/// Path from the document root to one encrypted scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SecretAddress {
    steps: Vec<Step>,
}

impl SecretAddress {
    /// Address of the document root itself, for documents that are a
    /// single `!vault` scalar.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    fn child(&self, step: Step) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        SecretAddress { steps }
    }

    /// Follow the address through `document`.
    ///
    /// Returns `None` when the document no longer has a node there.
    pub fn resolve<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        let mut node = document;
        for step in &self.steps {
            node = match step {
                Step::Key(key) => node
                    .as_mapping()?
                    .get(&Value::String(key.clone()))?,
                Step::Index(index) => node.as_sequence()?.get(*index)?,
            };
        }
        Some(node)
    }

    /// `resolve`, mutably.
    pub fn resolve_mut<'a>(&self, document: &'a mut Value) -> Option<&'a mut Value> {
        let mut node = document;
        for step in &self.steps {
            node = match step {
                Step::Key(key) => node
                    .as_mapping_mut()?
                    .get_mut(&Value::String(key.clone()))?,
                Step::Index(index) => node.as_sequence_mut()?.get_mut(*index)?,
            };
        }
        Some(node)
    }

    /// Swap the addressed node for `replacement`.
    ///
    /// Returns false when the address no longer resolves; the document is
    /// left untouched in that case.
    pub fn replace(&self, document: &mut Value, replacement: Value) -> bool {
        match self.resolve_mut(document) {
            Some(node) => {
                *node = replacement;
                true
            }
            None => false,
        }
    }
}

impl From<Vec<Step>> for SecretAddress {
    fn from(steps: Vec<Step>) -> Self {
        SecretAddress { steps }
    }
}

impl fmt::Display for SecretAddress {
    /// Renders like `users[1].secrets[1]`; the bare root is `<root>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return f.write_str("<root>");
        }
        for (position, step) in self.steps.iter().enumerate() {
            match step {
                Step::Key(key) => {
                    if position > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(key)?;
                }
                Step::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// Iterate over the address of every encrypted scalar in `document`, in
/// document order.
///
/// Only scalars reachable through string mapping keys and sequence
/// positions are yielded. Scalars hiding behind non-string keys or
/// foreign tags are invisible here; [`count_all_secrets`] exists so the
/// loader can detect that situation and refuse the document.
pub fn find_secrets(document: &Value) -> SecretIter<'_> {
    SecretIter {
        stack: vec![(document, SecretAddress::root())],
    }
}

/// Depth-first walk yielding [`SecretAddress`]es lazily.
///
/// The walk carries its own stack, so callers can stop early without
/// paying for the rest of the document, and document depth never turns
/// into call-stack depth.
pub struct SecretIter<'a> {
    stack: Vec<(&'a Value, SecretAddress)>,
}

impl Iterator for SecretIter<'_> {
    type Item = SecretAddress;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((value, address)) = self.stack.pop() {
            match value {
                Value::Tagged(_) if EncryptedScalar::is_encrypted(value) => {
                    return Some(address);
                }
                Value::Mapping(map) => {
                    // Push in reverse so popping yields document order.
                    let children: Vec<_> = map
                        .iter()
                        .filter_map(|(key, child)| key.as_str().map(|k| (k, child)))
                        .collect();
                    for (key, child) in children.into_iter().rev() {
                        self.stack
                            .push((child, address.child(Step::Key(key.to_owned()))));
                    }
                }
                Value::Sequence(seq) => {
                    for (index, child) in seq.iter().enumerate().rev() {
                        self.stack
                            .push((child, address.child(Step::Index(index))));
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// Count every encrypted scalar in `document`, including ones the
/// locator cannot reach: behind non-string mapping keys, inside mapping
/// keys themselves, or under foreign tags.
pub(crate) fn count_all_secrets(document: &Value) -> usize {
    let mut stack = vec![document];
    let mut count = 0;
    while let Some(value) = stack.pop() {
        match value {
            Value::Tagged(tagged) => {
                if EncryptedScalar::is_encrypted(value) {
                    count += 1;
                } else {
                    stack.push(&tagged.value);
                }
            }
            Value::Mapping(map) => {
                for (key, child) in map {
                    stack.push(key);
                    stack.push(child);
                }
            }
            Value::Sequence(seq) => stack.extend(seq.iter()),
            _ => {}
        }
    }
    count
}
