//! API-side authorization guard for commands.
//!
//! This enforces permissions at the command boundary (before the workflow
//! runs), while keeping domain aggregates and infra auth-agnostic. Which
//! role may take which status edge is a separate, domain-level check.

use depot_auth::{authorize, AuthzError, CommandAuthorization, Permission, Principal, Role, TenantMembership};

use crate::context::{PrincipalContext, TenantContext};

/// Check authorization for a command in the current request context.
///
/// This is intended to be called **before** invoking the workflow.
pub fn authorize_command<C: CommandAuthorization>(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let membership = TenantMembership {
        tenant_id: tenant.tenant_id(),
        roles: principal.roles().to_vec(),
        permissions: permissions_from_roles(principal.roles()),
    };

    let principal = Principal {
        principal_id: principal.principal_id(),
        active_tenant_id: tenant.tenant_id(),
        membership,
    };

    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }

    Ok(())
}

/// Role-to-permission mapping for the marketplace.
///
/// Admin roles get the wildcard; buyers own the order write surface and
/// suppliers own the catalog write surface. Both sides may request status
/// transitions (the status machine gates which edges each role can take).
fn permissions_from_roles(roles: &[Role]) -> Vec<Permission> {
    let mut perms: Vec<Permission> = Vec::new();
    for role in roles {
        match role {
            Role::Admin | Role::SuperAdmin => return vec![Permission::new("*")],
            Role::Customer | Role::GeneralContractor | Role::Subcontractor => {
                perms.extend([
                    Permission::new("orders.create"),
                    Permission::new("orders.add_item"),
                    Permission::new("orders.delete"),
                    Permission::new("orders.update_status"),
                ]);
            }
            Role::Supplier => {
                perms.extend([
                    Permission::new("catalog.products.create"),
                    Permission::new("catalog.products.receive_stock"),
                    Permission::new("orders.update_status"),
                    Permission::new("pools.lock"),
                ]);
            }
        }
    }
    perms.dedup();
    perms
}
