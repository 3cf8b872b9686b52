//! Facility lookups and caller identity.

use core::future::Future;
use std::collections::HashMap;

/// A facility known to the directory.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Facility {
    pub id: String,
    pub name: String,
}

/// Confirms that an organization code belongs to a real facility before a
/// block is issued for it.
pub trait FacilityDirectory: Send + Sync + 'static {
    /// `None` if no facility is registered under `code`.
    fn find(&self, code: &str) -> impl Future<Output = Option<Facility>> + Send;
}

/// A directory fixed at construction, typically from configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticDirectory {
    facilities: HashMap<String, Facility>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_facility(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.insert(id, name);
        self
    }

    pub fn insert(&mut self, id: impl Into<String>, name: impl Into<String>) {
        let id = id.into();
        self.facilities.insert(
            id.clone(),
            Facility {
                id,
                name: name.into(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.facilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for StaticDirectory
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut directory = Self::new();
        for (id, name) in iter {
            directory.insert(id, name);
        }
        directory
    }
}

impl FacilityDirectory for StaticDirectory {
    async fn find(&self, code: &str) -> Option<Facility> {
        self.facilities.get(code).cloned()
    }
}

/// Who asked for an allocation. Only ever copied into the block remark.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Actor {
    pub id: String,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none", default))]
    pub name: Option<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The text stored in [`GeneratedBlock::remark`](crate::GeneratedBlock).
    ///
    /// JSON when the `serde` feature is enabled, `id (name)` otherwise.
    pub fn remark(&self) -> String {
        #[cfg(feature = "serde")]
        if let Ok(json) = serde_json::to_string(self) {
            return json;
        }
        match &self.name {
            Some(name) => format!("{} ({name})", self.id),
            None => self.id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_directory_finds_registered_facilities() {
        let directory: StaticDirectory = [("10000059", "Dhaka Medical College")].into_iter().collect();
        assert_eq!(directory.len(), 1);
        assert_eq!(
            directory.find("10000059").await,
            Some(Facility {
                id: "10000059".to_string(),
                name: "Dhaka Medical College".to_string(),
            })
        );
        assert_eq!(directory.find("404").await, None);
    }

    #[test]
    fn actor_remark() {
        let actor = Actor::new("u-1").with_name("Admin");
        #[cfg(feature = "serde")]
        assert_eq!(actor.remark(), r#"{"id":"u-1","name":"Admin"}"#);
        #[cfg(not(feature = "serde"))]
        assert_eq!(actor.remark(), "u-1 (Admin)");

        #[cfg(not(feature = "serde"))]
        assert_eq!(Actor::new("u-2").remark(), "u-2");
    }
}
