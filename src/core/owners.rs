use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

/// Platform kind whose identities may trigger events over HTTP.
pub const EVENTS_PLATFORM: &str = "events";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Identity {
    pub platform: String,
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OwnerEntry {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub identities: Vec<Identity>,
}

/// Looks owners up for request authentication.
#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    async fn resolve_display_name(&self, display_name: &str) -> Option<String>;
    async fn identities(&self, owner_id: &str, platform: &str) -> Vec<Identity>;
}

#[derive(Default)]
pub struct StaticOwnerDirectory {
    by_name: HashMap<String, String>,
    identities: HashMap<String, Vec<Identity>>,
}

impl StaticOwnerDirectory {
    pub fn new(owners: &[OwnerEntry]) -> Self {
        let mut directory = Self::default();
        for owner in owners {
            directory
                .by_name
                .insert(owner.display_name.clone(), owner.id.clone());
            directory
                .identities
                .entry(owner.id.clone())
                .or_default()
                .extend(owner.identities.iter().cloned());
        }
        directory
    }
}

#[async_trait]
impl OwnerDirectory for StaticOwnerDirectory {
    async fn resolve_display_name(&self, display_name: &str) -> Option<String> {
        self.by_name.get(display_name).cloned()
    }

    async fn identities(&self, owner_id: &str, platform: &str) -> Vec<Identity> {
        self.identities
            .get(owner_id)
            .map(|all| {
                all.iter()
                    .filter(|identity| identity.platform == platform)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identities_are_filtered_by_platform() {
        let directory = StaticOwnerDirectory::new(&[OwnerEntry {
            id: "owner-1".to_string(),
            display_name: "raj".to_string(),
            identities: vec![
                Identity {
                    platform: EVENTS_PLATFORM.to_string(),
                    secret: "s3cret".to_string(),
                },
                Identity {
                    platform: "telegram".to_string(),
                    secret: "other".to_string(),
                },
            ],
        }]);

        assert_eq!(
            directory.resolve_display_name("raj").await.as_deref(),
            Some("owner-1")
        );
        assert_eq!(directory.resolve_display_name("nobody").await, None);
        let events = directory.identities("owner-1", EVENTS_PLATFORM).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].secret, "s3cret");
        assert!(directory.identities("owner-2", EVENTS_PLATFORM).await.is_empty());
    }
}
