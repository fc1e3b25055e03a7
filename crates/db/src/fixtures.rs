use casetrack_core::domain::directory::{
    Department, DepartmentId, NatureType, NatureTypeId, Role, User, UserId,
};
use casetrack_core::routing::{AutoRoutingConfig, RoutingStrategy};
use casetrack_core::store::{DirectoryStore, SettingsStore, StoreError};

/// Deterministic demo directory: two departments, a manager and default assignee each,
/// an admin, two clients and the common nature types.
struct SeedUser {
    id: &'static str,
    name: &'static str,
    role: Role,
    department_id: Option<&'static str>,
    email: Option<&'static str>,
    phone: Option<&'static str>,
}

struct SeedDepartment {
    id: &'static str,
    name: &'static str,
    manager_id: &'static str,
    default_assignee_id: &'static str,
}

const SEED_USERS: &[SeedUser] = &[
    SeedUser {
        id: "admin-1",
        name: "Ada Admin",
        role: Role::Admin,
        department_id: None,
        email: Some("admin@casetrack.test"),
        phone: None,
    },
    SeedUser {
        id: "mgr-support",
        name: "Sam Support",
        role: Role::Manager,
        department_id: Some("support"),
        email: Some("sam@casetrack.test"),
        phone: Some("+15550000001"),
    },
    SeedUser {
        id: "emp-support",
        name: "Eli Engineer",
        role: Role::Employee,
        department_id: Some("support"),
        email: Some("eli@casetrack.test"),
        phone: None,
    },
    SeedUser {
        id: "mgr-billing",
        name: "Bea Billing",
        role: Role::Manager,
        department_id: Some("billing"),
        email: Some("bea@casetrack.test"),
        phone: None,
    },
    SeedUser {
        id: "emp-billing",
        name: "Ben Books",
        role: Role::Employee,
        department_id: Some("billing"),
        email: Some("ben@casetrack.test"),
        phone: Some("+15550000002"),
    },
    SeedUser {
        id: "client-acme",
        name: "Acme Corp",
        role: Role::Client,
        department_id: None,
        email: Some("ops@acme.test"),
        phone: Some("+15550000003"),
    },
    SeedUser {
        id: "client-globex",
        name: "Globex Industries",
        role: Role::Client,
        department_id: None,
        email: Some("it@globex.test"),
        phone: None,
    },
];

const SEED_DEPARTMENTS: &[SeedDepartment] = &[
    SeedDepartment {
        id: "support",
        name: "Technical Support",
        manager_id: "mgr-support",
        default_assignee_id: "emp-support",
    },
    SeedDepartment {
        id: "billing",
        name: "Billing",
        manager_id: "mgr-billing",
        default_assignee_id: "emp-billing",
    },
];

const SEED_NATURE_TYPES: &[(&str, &str)] =
    &[("bug", "Bug"), ("billing", "Billing question"), ("access", "Access request")];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub departments: usize,
    pub nature_types: usize,
    pub auto_routing_enabled: bool,
}

/// Upserts the demo directory and enables round-robin auto-routing across its
/// departments. Safe to run repeatedly.
pub async fn seed_demo_directory(
    directory: &dyn DirectoryStore,
    settings: &dyn SettingsStore,
) -> Result<SeedSummary, StoreError> {
    for seed in SEED_USERS {
        directory
            .save_user(User {
                id: UserId(seed.id.to_owned()),
                name: seed.name.to_owned(),
                role: seed.role,
                department_id: seed.department_id.map(|id| DepartmentId(id.to_owned())),
                email: seed.email.map(str::to_owned),
                phone: seed.phone.map(str::to_owned),
                is_active: true,
            })
            .await?;
    }

    for seed in SEED_DEPARTMENTS {
        directory
            .save_department(Department {
                id: DepartmentId(seed.id.to_owned()),
                name: seed.name.to_owned(),
                manager_id: Some(UserId(seed.manager_id.to_owned())),
                default_assignee_id: Some(UserId(seed.default_assignee_id.to_owned())),
                is_active: true,
            })
            .await?;
    }

    for (id, name) in SEED_NATURE_TYPES {
        directory
            .save_nature_type(NatureType {
                id: NatureTypeId((*id).to_owned()),
                name: (*name).to_owned(),
                is_active: true,
            })
            .await?;
    }

    let routing = AutoRoutingConfig {
        enabled: true,
        departments: SEED_DEPARTMENTS.iter().map(|seed| DepartmentId(seed.id.to_owned())).collect(),
        default_department: Some(DepartmentId("support".to_owned())),
        strategy: RoutingStrategy::RoundRobin,
    };
    settings.save_auto_routing(&routing).await?;

    tracing::info!(
        event_name = "db.seed.directory_loaded",
        users = SEED_USERS.len(),
        departments = SEED_DEPARTMENTS.len(),
        nature_types = SEED_NATURE_TYPES.len(),
        "demo directory seeded"
    );

    Ok(SeedSummary {
        users: SEED_USERS.len(),
        departments: SEED_DEPARTMENTS.len(),
        nature_types: SEED_NATURE_TYPES.len(),
        auto_routing_enabled: routing.enabled,
    })
}
