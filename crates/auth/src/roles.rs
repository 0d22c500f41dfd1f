use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Actor role used for RBAC and for gating order status transitions.
///
/// The role set is closed: the order status machine matches exhaustively on
/// it, so adding a role forces every gate to be revisited at compile time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Supplier,
    GeneralContractor,
    Subcontractor,
    Admin,
    SuperAdmin,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Customer,
        Role::Supplier,
        Role::GeneralContractor,
        Role::Subcontractor,
        Role::Admin,
        Role::SuperAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Supplier => "supplier",
            Role::GeneralContractor => "general_contractor",
            Role::Subcontractor => "subcontractor",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// Elevated roles may initiate any graph-valid transition.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    /// Buyer-side roles share one (narrow) transition set.
    pub fn is_buyer(&self) -> bool {
        matches!(
            self,
            Role::Customer | Role::GeneralContractor | Role::Subcontractor
        )
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "supplier" => Ok(Role::Supplier),
            "general_contractor" => Ok(Role::GeneralContractor),
            "subcontractor" => Ok(Role::Subcontractor),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}
