//! Space entity and its validation rules

use super::collaborators::{Capability, PermissionGate};
use super::types::{SpaceId, Timestamp, User};
use serde::{Deserialize, Serialize};

/// A named namespace partition with an owner, administrators and status flags.
///
/// A space is *transient* until the repository assigns it an identifier.
/// Key, description and owner are validated on construction and on every
/// mutation, so an instance never holds an invalid value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Space {
    /// `0` while transient
    id: i64,
    key: String,
    name: String,
    description: String,
    owner: User,
    /// Display names; duplicates and unknown names are filtered at persistence
    administrators: Vec<String>,
    archived: bool,
    protected: bool,
    created_at: Option<Timestamp>,
}

impl Space {
    /// Create a transient space from user-supplied values
    pub fn from_values(
        key: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        owner: User,
    ) -> Result<Self, ValidationError> {
        let key = normalize_key(&key.into())?;
        let description = validate_description(description.into())?;
        validate_owner(&owner)?;

        Ok(Space {
            id: 0,
            key,
            name: name.into(),
            description,
            owner,
            administrators: Vec::new(),
            archived: false,
            protected: false,
            created_at: None,
        })
    }

    /// Rebuild a persisted space from stored attributes
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_stored(
        id: SpaceId,
        key: String,
        name: String,
        description: String,
        owner: User,
        administrators: Vec<String>,
        archived: bool,
        protected: bool,
        created_at: Timestamp,
    ) -> Result<Self, ValidationError> {
        if !id.is_even() {
            return Err(ValidationError::OddId(id.as_i64()));
        }

        let mut space = Self::from_values(key, name, description, owner)?;
        space.id = id.as_i64();
        space.administrators = administrators;
        space.archived = archived;
        space.protected = protected;
        space.created_at = Some(created_at);
        Ok(space)
    }

    /// Whether the space has been written to the store
    pub fn exists(&self) -> bool {
        self.id != 0
    }

    /// Identifier, or `None` while transient
    pub fn try_id(&self) -> Option<SpaceId> {
        self.exists().then_some(SpaceId(self.id))
    }

    /// Identifier of a persisted space
    ///
    /// # Panics
    ///
    /// Panics when called on a transient space. Callers must only ask for the
    /// identifier after the space has been created or loaded.
    pub fn id(&self) -> SpaceId {
        assert!(self.exists(), "space '{}' has no identifier before it is persisted", self.key);
        SpaceId(self.id)
    }

    /// Identifier of the paired talk namespace, always `id + 1`
    ///
    /// # Panics
    ///
    /// Same contract as [`Space::id`].
    pub fn talk_id(&self) -> SpaceId {
        self.id().talk_id()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn owner(&self) -> &User {
        &self.owner
    }

    pub fn administrators(&self) -> &[String] {
        &self.administrators
    }

    pub fn is_archived(&self) -> bool {
        self.archived
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }

    pub fn created_at(&self) -> Option<Timestamp> {
        self.created_at
    }

    pub fn set_key(&mut self, key: &str) -> Result<(), ValidationError> {
        self.key = normalize_key(key)?;
        Ok(())
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> Result<(), ValidationError> {
        self.description = validate_description(description.into())?;
        Ok(())
    }

    pub fn set_owner(&mut self, owner: User) -> Result<(), ValidationError> {
        validate_owner(&owner)?;
        self.owner = owner;
        Ok(())
    }

    pub fn set_administrators(&mut self, administrators: Vec<String>) {
        self.administrators = administrators;
    }

    pub fn set_archived(&mut self, archived: bool) {
        self.archived = archived;
    }

    pub fn set_protected(&mut self, protected: bool) {
        self.protected = protected;
    }

    /// Whether `user` may change this space's settings
    pub fn can_edit(&self, user: &User, gate: &dyn PermissionGate) -> bool {
        self.administrators.iter().any(|admin| admin == &user.name)
            || gate.user_has_capability(user, Capability::EditAllSpaces)
    }

    /// Whether `user` may edit pages inside a protected space
    pub fn can_edit_pages(&self, user: &User, gate: &dyn PermissionGate) -> bool {
        gate.user_has_capability(user, Capability::EditProtectedPages)
    }

    /// Whether `actor` may archive spaces at all
    pub fn can_archive(archiving_enabled: bool, actor: &User, gate: &dyn PermissionGate) -> bool {
        archiving_enabled && gate.user_has_capability(actor, Capability::ArchiveSpaces)
    }

    /// Attribute snapshot used in audit events
    pub fn snapshot(&self) -> SpaceSnapshot {
        SpaceSnapshot {
            key: self.key.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            owner: self.owner.name.clone(),
            administrators: self.administrators.clone(),
            archived: self.archived,
            protected: self.protected,
        }
    }
}

/// Serializable view of the mutable attributes of a space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceSnapshot {
    pub key: String,
    pub name: String,
    pub description: String,
    pub owner: String,
    pub administrators: Vec<String>,
    pub archived: bool,
    pub protected: bool,
}

/// Invalid entity values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Space key must not be empty")]
    EmptyKey,

    #[error("Space key must be alphanumeric: {0}")]
    NonAlphanumericKey(String),

    #[error("Space description must not be empty")]
    EmptyDescription,

    #[error("Space owner must not be anonymous")]
    AnonymousOwner,

    #[error("Space identifier must be even: {0}")]
    OddId(i64),
}

/// Validate a key and bring it into canonical form (leading capital)
pub fn normalize_key(key: &str) -> Result<String, ValidationError> {
    if key.is_empty() {
        return Err(ValidationError::EmptyKey);
    }
    if !key.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::NonAlphanumericKey(key.to_string()));
    }

    let mut chars = key.chars();
    Ok(match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    })
}

fn validate_description(description: String) -> Result<String, ValidationError> {
    if description.is_empty() {
        return Err(ValidationError::EmptyDescription);
    }
    Ok(description)
}

fn validate_owner(owner: &User) -> Result<(), ValidationError> {
    if owner.is_anonymous() {
        return Err(ValidationError::AnonymousOwner);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_space::types::UserId;
    use proptest::prelude::*;

    struct Grants(Vec<Capability>);

    impl PermissionGate for Grants {
        fn user_has_capability(&self, _user: &User, capability: Capability) -> bool {
            self.0.contains(&capability)
        }
    }

    fn alice() -> User {
        User::new(UserId(1), "Alice")
    }

    #[test]
    fn test_from_values_normalizes_key() {
        let space = Space::from_values("legal", "Legal Affairs", "desc", alice()).unwrap();

        assert_eq!(space.key(), "Legal");
        assert_eq!(space.name(), "Legal Affairs");
        assert!(!space.exists());
        assert!(space.try_id().is_none());
        assert!(!space.is_archived());
        assert!(!space.is_protected());
        assert!(space.administrators().is_empty());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert_eq!(
            Space::from_values("", "n", "d", alice()).unwrap_err(),
            ValidationError::EmptyKey
        );
        assert_eq!(
            Space::from_values("Legal Affairs", "n", "d", alice()).unwrap_err(),
            ValidationError::NonAlphanumericKey("Legal Affairs".to_string())
        );
        assert_eq!(
            Space::from_values("Legal", "n", "", alice()).unwrap_err(),
            ValidationError::EmptyDescription
        );
        assert_eq!(
            Space::from_values("Legal", "n", "d", User::anonymous("10.0.0.1")).unwrap_err(),
            ValidationError::AnonymousOwner
        );
    }

    #[test]
    fn test_mutators_validate() {
        let mut space = Space::from_values("Legal", "n", "d", alice()).unwrap();

        assert!(space.set_key("Legal-2").is_err());
        assert_eq!(space.key(), "Legal");
        assert!(space.set_description("").is_err());
        assert!(space.set_owner(User::anonymous("x")).is_err());

        space.set_key("finance").unwrap();
        assert_eq!(space.key(), "Finance");
    }

    #[test]
    #[should_panic(expected = "before it is persisted")]
    fn test_id_of_transient_space_panics() {
        let space = Space::from_values("Legal", "n", "d", alice()).unwrap();
        let _ = space.id();
    }

    #[test]
    fn test_stored_space_exposes_ids() {
        let space = Space::from_stored(
            SpaceId(50_000),
            "Legal".to_string(),
            "Legal Affairs".to_string(),
            "desc".to_string(),
            alice(),
            vec!["Alice".to_string()],
            false,
            true,
            Timestamp::from_millis(1),
        )
        .unwrap();

        assert_eq!(space.id(), SpaceId(50_000));
        assert_eq!(space.talk_id(), SpaceId(50_001));
        assert!(space.is_protected());
    }

    #[test]
    fn test_stored_space_rejects_odd_id() {
        let result = Space::from_stored(
            SpaceId(50_001),
            "Legal".to_string(),
            "n".to_string(),
            "d".to_string(),
            alice(),
            Vec::new(),
            false,
            false,
            Timestamp::from_millis(1),
        );
        assert_eq!(result.unwrap_err(), ValidationError::OddId(50_001));
    }

    #[test]
    fn test_can_edit() {
        let mut space = Space::from_values("Legal", "n", "d", alice()).unwrap();
        space.set_administrators(vec!["Alice".to_string()]);
        let bob = User::new(UserId(2), "Bob");

        assert!(space.can_edit(&alice(), &Grants(vec![])));
        assert!(!space.can_edit(&bob, &Grants(vec![])));
        assert!(space.can_edit(&bob, &Grants(vec![Capability::EditAllSpaces])));
    }

    #[test]
    fn test_can_edit_pages_ignores_admin_list() {
        let mut space = Space::from_values("Legal", "n", "d", alice()).unwrap();
        space.set_administrators(vec!["Alice".to_string()]);
        space.set_protected(true);

        assert!(!space.can_edit_pages(&alice(), &Grants(vec![])));
        assert!(space.can_edit_pages(&alice(), &Grants(vec![Capability::EditProtectedPages])));
    }

    #[test]
    fn test_can_archive_requires_config_and_capability() {
        let gate = Grants(vec![Capability::ArchiveSpaces]);
        assert!(Space::can_archive(true, &alice(), &gate));
        assert!(!Space::can_archive(false, &alice(), &gate));
        assert!(!Space::can_archive(true, &alice(), &Grants(vec![])));
    }

    proptest! {
        #[test]
        fn prop_alphanumeric_keys_normalize_to_leading_capital(key in "[a-zA-Z0-9]{1,24}") {
            let normalized = normalize_key(&key).unwrap();
            prop_assert_eq!(normalized.len(), key.len());
            prop_assert_eq!(&normalized[1..], &key[1..]);
            let first = normalized.chars().next().unwrap();
            prop_assert!(!first.is_ascii_lowercase());
        }

        #[test]
        fn prop_keys_with_other_characters_are_rejected(key in "[a-z]{0,5}[ _\\-.:/][a-z]{0,5}") {
            prop_assert!(normalize_key(&key).is_err());
        }
    }
}
