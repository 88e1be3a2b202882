//! Stable per-instance identity and message-id generation.
//!
//! `instanceId = "{hostname}-{md5(projectPath)[0..6]}-{pid}"`. The id is
//! immutable for the process lifetime; message ids append a strictly
//! increasing sequence number and an epoch-millisecond stamp.

use md5::{Digest, Md5};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().try_into().unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Identity of one running IDE process holding one project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceId(String);

impl InstanceId {
    /// Derive the identity for this process and project.
    pub fn for_project(project_path: &str) -> Self {
        Self::derive(project_path, std::process::id())
    }

    fn derive(project_path: &str, pid: u32) -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string());
        let digest = format!("{:x}", Md5::digest(project_path.as_bytes()));
        Self(format!("{}-{}-{}", host, &digest[..6], pid))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Thread-safe generator of unique message ids for one instance.
#[derive(Debug)]
pub struct MessageIdGen {
    instance: InstanceId,
    sequence: AtomicU64,
}

impl MessageIdGen {
    pub fn new(instance: InstanceId) -> Self {
        Self {
            instance,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance
    }

    /// `"{instanceId}-{sequence}-{epochMs}"`, unique across the process
    /// lifetime.
    pub fn next(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}-{}-{}", self.instance, seq, epoch_millis())
    }

    /// Sequence number embedded in a message id, if it parses.
    pub fn sequence_of(message_id: &str) -> Option<u64> {
        let mut parts = message_id.rsplitn(3, '-');
        let _epoch = parts.next()?;
        parts.next()?.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_id_shape() {
        let id = InstanceId::derive("/home/u/proj", 4242);
        let text = id.to_string();
        assert!(text.ends_with("-4242"), "got {text}");
        // hostname-hash6-pid: the digest segment is 6 lowercase hex chars.
        let hash = text.rsplitn(3, '-').nth(1).unwrap();
        assert_eq!(hash.len(), 6);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_same_project_same_hash() {
        let a = InstanceId::derive("/home/u/proj", 1);
        let b = InstanceId::derive("/home/u/proj", 2);
        let hash = |id: &InstanceId| id.as_str().rsplitn(3, '-').nth(1).unwrap().to_string();
        assert_eq!(hash(&a), hash(&b));
        let c = InstanceId::derive("/home/u/other", 1);
        assert_ne!(hash(&a), hash(&c));
    }

    #[test]
    fn test_sequences_strictly_increase() {
        let ids = MessageIdGen::new(InstanceId::derive("/p", 7));
        let seqs: Vec<u64> = (0..50)
            .map(|_| MessageIdGen::sequence_of(&ids.next()).unwrap())
            .collect();
        for window in seqs.windows(2) {
            assert!(window[0] < window[1]);
        }
        assert_eq!(seqs[0], 1);
    }

    #[test]
    fn test_message_ids_unique() {
        let ids = MessageIdGen::new(InstanceId::derive("/p", 7));
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            assert!(seen.insert(ids.next()));
        }
    }
}
