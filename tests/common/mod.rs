#![allow(dead_code)]

use std::sync::Once;

use penumbra::storage::MemoryGraph;
use penumbra::traversal::procedure::EdgeKind;
use penumbra::traversal::{Identifier, VertexMap};
use penumbra::types::{Result, ThingId, TypeId, Value, ValueKind, Vertex};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a stderr subscriber once per test binary. `RUST_LOG` picks the level.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

pub fn role_player(labels: &[&str]) -> EdgeKind {
    EdgeKind::RolePlayer {
        role_types: labels.iter().map(|label| (*label).into()).collect(),
    }
}

pub fn answer(bindings: &[(&Identifier, ThingId)]) -> VertexMap {
    bindings
        .iter()
        .map(|(id, thing)| ((*id).clone(), Vertex::Thing(*thing)))
        .collect()
}

/// Access-control schema: a permission relates a subject to an access, and an
/// access relates an object to an action.
pub struct AccessGraph {
    pub graph: MemoryGraph,
    pub person: TypeId,
    pub file: TypeId,
    pub operation: TypeId,
    pub access: TypeId,
    pub permission: TypeId,
    pub subject: TypeId,
    pub access_role: TypeId,
    pub object: TypeId,
    pub action: TypeId,
}

impl AccessGraph {
    pub fn new() -> Result<Self> {
        let mut graph = MemoryGraph::new();
        let person = graph.define_entity("person")?;
        let file = graph.define_entity("file")?;
        let operation = graph.define_entity("operation")?;
        let access = graph.define_relation("access")?;
        let permission = graph.define_relation("permission")?;
        let object = graph.define_role(access, "object")?;
        let action = graph.define_role(access, "action")?;
        let subject = graph.define_role(permission, "subject")?;
        let access_role = graph.define_role(permission, "access")?;
        graph.set_plays(file, object)?;
        graph.set_plays(operation, action)?;
        graph.set_plays(person, subject)?;
        graph.set_plays(access, access_role)?;
        Ok(Self {
            graph,
            person,
            file,
            operation,
            access,
            permission,
            subject,
            access_role,
            object,
            action,
        })
    }

    /// Creates `access(object: file, action: operation)`.
    pub fn grant_access(&mut self, file: ThingId, operation: ThingId) -> Result<ThingId> {
        let access = self.graph.insert_relation(self.access)?;
        self.graph.add_role_player(access, self.object, file)?;
        self.graph.add_role_player(access, self.action, operation)?;
        Ok(access)
    }

    /// Creates `permission(subject: person, access: access)`.
    pub fn permit(&mut self, person: ThingId, access: ThingId) -> Result<ThingId> {
        let permission = self.graph.insert_relation(self.permission)?;
        self.graph.add_role_player(permission, self.subject, person)?;
        self.graph.add_role_player(permission, self.access_role, access)?;
        Ok(permission)
    }
}

/// People with names, grouped into teams with member and leader roles.
pub struct TeamGraph {
    pub graph: MemoryGraph,
    pub person: TypeId,
    pub team: TypeId,
    pub member: TypeId,
    pub leader: TypeId,
    pub name: TypeId,
}

impl TeamGraph {
    pub fn new() -> Result<Self> {
        let mut graph = MemoryGraph::new();
        let person = graph.define_entity("person")?;
        let team = graph.define_relation("team")?;
        let member = graph.define_role(team, "member")?;
        let leader = graph.define_role(team, "leader")?;
        let name = graph.define_attribute("name", ValueKind::String)?;
        graph.set_plays(person, member)?;
        graph.set_plays(person, leader)?;
        graph.set_owns(person, name)?;
        Ok(Self {
            graph,
            person,
            team,
            member,
            leader,
            name,
        })
    }

    pub fn person(&mut self, names: &[&str]) -> Result<ThingId> {
        let person = self.graph.insert_entity(self.person)?;
        for name in names {
            let attribute = self.graph.insert_attribute(self.name, Value::from(*name))?;
            self.graph.add_has(person, attribute)?;
        }
        Ok(person)
    }

    pub fn team(&mut self, members: &[ThingId], leaders: &[ThingId]) -> Result<ThingId> {
        let team = self.graph.insert_relation(self.team)?;
        for member in members {
            self.graph.add_role_player(team, self.member, *member)?;
        }
        for leader in leaders {
            self.graph.add_role_player(team, self.leader, *leader)?;
        }
        Ok(team)
    }
}
