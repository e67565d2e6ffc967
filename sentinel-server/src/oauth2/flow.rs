use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

const STATE_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FlowStatus {
    Pending,
    Completed { subject: String },
}

/// A login in progress, stored under `state:<state>` until consumed or expired
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    #[serde(flatten)]
    pub status: FlowStatus,
    pub expires_at: DateTime<Utc>,
}

impl Flow {
    pub fn pending(ttl: Duration) -> Self {
        Self {
            status: FlowStatus::Pending,
            expires_at: Utc::now() + ttl,
        }
    }

    /// Same flow, completed for `subject`, keeping its deadline
    pub fn completed(&self, subject: &str) -> Self {
        Self {
            status: FlowStatus::Completed {
                subject: subject.to_string(),
            },
            expires_at: self.expires_at,
        }
    }

    pub fn remaining(&self) -> std::time::Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or_default()
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

pub fn flow_key(state: &str) -> String {
    format!("state:{state}")
}

/// Held by the callback that is driving a flow
pub fn claim_key(state: &str) -> String {
    format!("state:{state}:claim")
}

/// Unguessable state value from the OS CSPRNG
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_generate_state() {
        let states: HashSet<String> = (0..64).map(|_| generate_state()).collect();
        assert_eq!(states.len(), 64);
        for state in &states {
            assert_eq!(state.len(), 43);
            assert_eq!(URL_SAFE_NO_PAD.decode(state).unwrap().len(), STATE_BYTES);
        }
    }

    #[test]
    fn test_flow_wire_format() {
        let pending = Flow::pending(Duration::minutes(10));
        let value = serde_json::to_value(&pending).unwrap();
        assert_eq!(value["status"], json!("pending"));
        assert!(value.get("subject").is_none());

        let completed = pending.completed("42");
        let value = serde_json::to_value(&completed).unwrap();
        assert_eq!(value["status"], json!("completed"));
        assert_eq!(value["subject"], json!("42"));
        assert_eq!(serde_json::from_value::<Flow>(value).unwrap(), completed);
        assert_eq!(completed.expires_at, pending.expires_at);
    }

    #[test]
    fn test_remaining() {
        let flow = Flow::pending(Duration::minutes(10));
        assert!(!flow.is_expired());
        assert!(flow.remaining() > std::time::Duration::from_secs(590));

        let expired = Flow::pending(Duration::seconds(-1));
        assert!(expired.is_expired());
        assert_eq!(expired.remaining(), std::time::Duration::ZERO);
    }

    #[test]
    fn test_keys() {
        assert_eq!(flow_key("abc"), "state:abc");
        assert_eq!(claim_key("abc"), "state:abc:claim");
    }
}
