//! Recipient graph: persons, groups and roles plus their transport configurations.
//!
//! Recipients live in an arena keyed by [`RecipientId`]. Every cross-reference
//! (group membership, role assignment, the back-references a person keeps to its
//! roles and groups) is an id, never an owning pointer, so membership cycles are
//! representable and cost nothing to hold.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::configuration::TransportConfiguration;

/// Time-ordered recipient identifier (UUID v7).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct RecipientId(Uuid);

impl RecipientId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for RecipientId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for RecipientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Discriminant of a [`RecipientKind`], used for storage and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientType {
    Person,
    Group,
    Role,
}

impl std::fmt::Display for RecipientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecipientType::Person => write!(f, "person"),
            RecipientType::Group => write!(f, "group"),
            RecipientType::Role => write!(f, "role"),
        }
    }
}

impl std::str::FromStr for RecipientType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "person" => Ok(RecipientType::Person),
            "group" => Ok(RecipientType::Group),
            "role" => Ok(RecipientType::Role),
            other => Err(GraphError::UnknownType(other.to_string())),
        }
    }
}

/// A leaf recipient. Role and group references are back-references only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Person {
    pub roles: Vec<RecipientId>,
    pub groups: Vec<RecipientId>,
}

/// An ordered collection of members of any kind, other groups included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    pub members: Vec<RecipientId>,
}

impl Group {
    /// A group can resolve into members only if it has any.
    pub fn can_resolve(&self) -> bool {
        !self.members.is_empty()
    }
}

/// A function that may be delegated to one assigned person.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Role {
    pub assigned_person: Option<RecipientId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientKind {
    Person(Person),
    Group(Group),
    Role(Role),
}

impl RecipientKind {
    pub fn recipient_type(&self) -> RecipientType {
        match self {
            RecipientKind::Person(_) => RecipientType::Person,
            RecipientKind::Group(_) => RecipientType::Group,
            RecipientKind::Role(_) => RecipientType::Role,
        }
    }

    fn empty(recipient_type: RecipientType) -> Self {
        match recipient_type {
            RecipientType::Person => RecipientKind::Person(Person::default()),
            RecipientType::Group => RecipientKind::Group(Group::default()),
            RecipientType::Role => RecipientKind::Role(Role::default()),
        }
    }
}

/// An addressable party owning zero or more transport configurations.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    id: RecipientId,
    pub name: String,
    pub kind: RecipientKind,
    /// Kept in insertion order; rank ties are broken by this order.
    pub configurations: Vec<TransportConfiguration>,
}

impl Recipient {
    pub fn new(id: RecipientId, name: impl Into<String>, recipient_type: RecipientType) -> Self {
        Self {
            id,
            name: name.into(),
            kind: RecipientKind::empty(recipient_type),
            configurations: Vec::new(),
        }
    }

    pub fn id(&self) -> RecipientId {
        self.id
    }

    pub fn recipient_type(&self) -> RecipientType {
        self.kind.recipient_type()
    }
}

/// Errors raised while building a recipient graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("unknown recipient {0}")]
    UnknownRecipient(RecipientId),

    #[error("recipient {0} is not a group")]
    NotAGroup(RecipientId),

    #[error("recipient {0} is not a role")]
    NotARole(RecipientId),

    #[error("recipient {0} is not a person")]
    NotAPerson(RecipientId),

    #[error("unknown recipient type '{0}'")]
    UnknownType(String),

    #[error("recipient {0} already exists")]
    Duplicate(RecipientId),
}

/// Read access to recipients by id.
pub trait RecipientRepository {
    fn recipient(&self, id: RecipientId) -> Option<&Recipient>;
}

/// In-memory arena of recipients.
#[derive(Debug, Clone, Default)]
pub struct RecipientGraph {
    recipients: HashMap<RecipientId, Recipient>,
}

impl RecipientGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    /// Insert a recipient with a caller-chosen id.
    pub fn insert(&mut self, recipient: Recipient) -> Result<RecipientId, GraphError> {
        let id = recipient.id();
        if self.recipients.contains_key(&id) {
            return Err(GraphError::Duplicate(id));
        }
        self.recipients.insert(id, recipient);
        Ok(id)
    }

    pub fn add_person(&mut self, name: impl Into<String>) -> RecipientId {
        self.add(name, RecipientType::Person)
    }

    pub fn add_group(&mut self, name: impl Into<String>) -> RecipientId {
        self.add(name, RecipientType::Group)
    }

    pub fn add_role(&mut self, name: impl Into<String>) -> RecipientId {
        self.add(name, RecipientType::Role)
    }

    fn add(&mut self, name: impl Into<String>, recipient_type: RecipientType) -> RecipientId {
        let id = RecipientId::generate();
        self.recipients
            .insert(id, Recipient::new(id, name, recipient_type));
        id
    }

    /// Append `member` to `group`. Adding an existing member is a no-op.
    ///
    /// Persons get a back-reference to the group.
    pub fn add_member(&mut self, group: RecipientId, member: RecipientId) -> Result<(), GraphError> {
        if !self.recipients.contains_key(&member) {
            return Err(GraphError::UnknownRecipient(member));
        }

        let group_recipient = self
            .recipients
            .get_mut(&group)
            .ok_or(GraphError::UnknownRecipient(group))?;
        let RecipientKind::Group(g) = &mut group_recipient.kind else {
            return Err(GraphError::NotAGroup(group));
        };
        if g.members.contains(&member) {
            return Ok(());
        }
        g.members.push(member);

        if let Some(Recipient {
            kind: RecipientKind::Person(person),
            ..
        }) = self.recipients.get_mut(&member)
            && !person.groups.contains(&group)
        {
            person.groups.push(group);
        }

        Ok(())
    }

    /// Assign `person` to `role`, replacing any previous assignment.
    pub fn assign_person(&mut self, role: RecipientId, person: RecipientId) -> Result<(), GraphError> {
        match self.recipients.get(&person).map(|r| &r.kind) {
            Some(RecipientKind::Person(_)) => {}
            Some(_) => return Err(GraphError::NotAPerson(person)),
            None => return Err(GraphError::UnknownRecipient(person)),
        }

        let role_recipient = self
            .recipients
            .get_mut(&role)
            .ok_or(GraphError::UnknownRecipient(role))?;
        let RecipientKind::Role(r) = &mut role_recipient.kind else {
            return Err(GraphError::NotARole(role));
        };
        let previous = r.assigned_person.replace(person);

        if let Some(previous) = previous
            && let Some(Recipient {
                kind: RecipientKind::Person(p),
                ..
            }) = self.recipients.get_mut(&previous)
        {
            p.roles.retain(|id| *id != role);
        }

        if let Some(Recipient {
            kind: RecipientKind::Person(p),
            ..
        }) = self.recipients.get_mut(&person)
            && !p.roles.contains(&role)
        {
            p.roles.push(role);
        }

        Ok(())
    }

    /// Remove the assigned person from `role`, if any.
    pub fn unassign_person(&mut self, role: RecipientId) -> Result<(), GraphError> {
        let role_recipient = self
            .recipients
            .get_mut(&role)
            .ok_or(GraphError::UnknownRecipient(role))?;
        let RecipientKind::Role(r) = &mut role_recipient.kind else {
            return Err(GraphError::NotARole(role));
        };

        if let Some(previous) = r.assigned_person.take()
            && let Some(Recipient {
                kind: RecipientKind::Person(p),
                ..
            }) = self.recipients.get_mut(&previous)
        {
            p.roles.retain(|id| *id != role);
        }
        Ok(())
    }

    /// Append a configuration to a recipient (insertion order is kept).
    pub fn add_configuration(
        &mut self,
        recipient: RecipientId,
        configuration: TransportConfiguration,
    ) -> Result<(), GraphError> {
        self.recipients
            .get_mut(&recipient)
            .ok_or(GraphError::UnknownRecipient(recipient))?
            .configurations
            .push(configuration);
        Ok(())
    }
}

impl RecipientRepository for RecipientGraph {
    fn recipient(&self, id: RecipientId) -> Option<&Recipient> {
        self.recipients.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_member_records_back_reference() {
        let mut graph = RecipientGraph::new();
        let group = graph.add_group("ops");
        let alice = graph.add_person("alice");

        graph.add_member(group, alice).unwrap();
        graph.add_member(group, alice).unwrap();

        let RecipientKind::Group(g) = &graph.recipient(group).unwrap().kind else {
            panic!("expected group");
        };
        assert_eq!(g.members, vec![alice]);

        let RecipientKind::Person(p) = &graph.recipient(alice).unwrap().kind else {
            panic!("expected person");
        };
        assert_eq!(p.groups, vec![group]);
    }

    #[test]
    fn test_group_may_contain_itself_transitively() {
        let mut graph = RecipientGraph::new();
        let a = graph.add_group("a");
        let b = graph.add_group("b");
        graph.add_member(a, b).unwrap();
        graph.add_member(b, a).unwrap();
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_add_member_to_non_group_fails() {
        let mut graph = RecipientGraph::new();
        let alice = graph.add_person("alice");
        let bob = graph.add_person("bob");
        assert_eq!(graph.add_member(alice, bob), Err(GraphError::NotAGroup(alice)));
    }

    #[test]
    fn test_reassigning_role_moves_back_reference() {
        let mut graph = RecipientGraph::new();
        let role = graph.add_role("on-call");
        let alice = graph.add_person("alice");
        let bob = graph.add_person("bob");

        graph.assign_person(role, alice).unwrap();
        graph.assign_person(role, bob).unwrap();

        let RecipientKind::Person(a) = &graph.recipient(alice).unwrap().kind else {
            panic!("expected person");
        };
        let RecipientKind::Person(b) = &graph.recipient(bob).unwrap().kind else {
            panic!("expected person");
        };
        assert!(a.roles.is_empty());
        assert_eq!(b.roles, vec![role]);

        graph.unassign_person(role).unwrap();
        let RecipientKind::Role(r) = &graph.recipient(role).unwrap().kind else {
            panic!("expected role");
        };
        assert!(r.assigned_person.is_none());
    }

    #[test]
    fn test_role_cannot_delegate_to_group() {
        let mut graph = RecipientGraph::new();
        let role = graph.add_role("on-call");
        let group = graph.add_group("ops");
        assert_eq!(
            graph.assign_person(role, group),
            Err(GraphError::NotAPerson(group))
        );
    }

    #[test]
    fn test_recipient_type_round_trips_through_str() {
        for ty in [RecipientType::Person, RecipientType::Group, RecipientType::Role] {
            assert_eq!(ty.to_string().parse::<RecipientType>().unwrap(), ty);
        }
        assert!("robot".parse::<RecipientType>().is_err());
    }
}
