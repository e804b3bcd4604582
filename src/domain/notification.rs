use crate::error::{PushError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

/// A JSON object payload. APNs sends it verbatim, C2DM flattens it into `data.*` fields.
pub type Payload = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

pub type Targets = OneOrMany<String>;
pub type Payloads = OneOrMany<Payload>;

impl<T> OneOrMany<T> {
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(items) => items.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> From<T> for OneOrMany<T> {
    fn from(item: T) -> Self {
        Self::One(item)
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(items: Vec<T>) -> Self {
        Self::Many(items)
    }
}

/// Aligns targets with payloads.
///
/// A single payload is shared by every target. A payload sequence must have
/// exactly one entry per target.
///
/// # Errors
/// Returns `PushError::ArityMismatch` when a payload sequence does not line up with the targets.
pub fn pair<T, P: Clone>(targets: OneOrMany<T>, payloads: OneOrMany<P>) -> Result<Vec<(T, P)>> {
    match payloads {
        OneOrMany::One(payload) => Ok(targets.into_vec().into_iter().map(|t| (t, payload.clone())).collect()),
        OneOrMany::Many(payloads) => {
            let targets = targets.into_vec();
            if targets.len() != payloads.len() {
                return Err(PushError::ArityMismatch { tokens: targets.len(), payloads: payloads.len() });
            }
            Ok(targets.into_iter().zip(payloads).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_targets_deserialize_one_or_many() {
        let one: Targets = serde_json::from_value(json!("abcd")).unwrap();
        assert_eq!(one, OneOrMany::One("abcd".to_string()));

        let many: Targets = serde_json::from_value(json!(["ab", "cd"])).unwrap();
        assert_eq!(many.len(), 2);
    }

    #[test]
    fn test_pair_broadcasts_single_payload() {
        let pairs = pair(OneOrMany::Many(vec![1, 2, 3]), OneOrMany::One("p")).unwrap();
        assert_eq!(pairs, vec![(1, "p"), (2, "p"), (3, "p")]);
    }

    #[test]
    fn test_pair_rejects_misaligned_sequences() {
        let err = pair(OneOrMany::Many(vec![1, 2]), OneOrMany::Many(vec!["a"])).unwrap_err();
        assert!(matches!(err, PushError::ArityMismatch { tokens: 2, payloads: 1 }));

        let err = pair(OneOrMany::One(1), OneOrMany::Many(vec!["a", "b"])).unwrap_err();
        assert!(matches!(err, PushError::ArityMismatch { tokens: 1, payloads: 2 }));
    }
}
