use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depot_catalog::ProductId;
use depot_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use depot_events::Event;
use depot_orders::OrderId;

/// Pool identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(pub AggregateId);

impl PoolId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PoolId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolStatus {
    Open,
    Locked,
    Completed,
}

/// One buyer's commitment to the pool, keyed by the order that made it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMember {
    pub order_id: OrderId,
    pub buyer: UserId,
    pub quantity: i64,
}

/// Aggregate root: Pool.
///
/// `committed_quantity` is derived from members and kept in lockstep by
/// `apply`. A locked pool rejects new joins but members may still leave.
/// A completed pool is frozen: no joins, no leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    id: PoolId,
    tenant_id: Option<TenantId>,
    product_id: Option<ProductId>,
    target_quantity: i64,
    committed_quantity: i64,
    members: Vec<PoolMember>,
    status: PoolStatus,
    expires_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Pool {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PoolId) -> Self {
        Self {
            id,
            tenant_id: None,
            product_id: None,
            target_quantity: 0,
            committed_quantity: 0,
            members: Vec::new(),
            status: PoolStatus::Open,
            expires_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PoolId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn target_quantity(&self) -> i64 {
        self.target_quantity
    }

    pub fn committed_quantity(&self) -> i64 {
        self.committed_quantity
    }

    pub fn members(&self) -> &[PoolMember] {
        &self.members
    }

    pub fn status(&self) -> PoolStatus {
        self.status
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn exists(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Pool {
    type Id = PoolId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenPool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPool {
    pub tenant_id: TenantId,
    pub pool_id: PoolId,
    pub product_id: ProductId,
    pub target_quantity: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: JoinPool (an order enters pooling with its committed quantity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPool {
    pub tenant_id: TenantId,
    pub pool_id: PoolId,
    pub order_id: OrderId,
    pub buyer: UserId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: LeavePool (pooling order cancelled before the pool filled).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeavePool {
    pub tenant_id: TenantId,
    pub pool_id: PoolId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: LockPool. Freezes joins while existing members may still leave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPool {
    pub tenant_id: TenantId,
    pub pool_id: PoolId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolCommand {
    OpenPool(OpenPool),
    JoinPool(JoinPool),
    LeavePool(LeavePool),
    LockPool(LockPool),
}

/// Event: PoolOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolOpened {
    pub tenant_id: TenantId,
    pub pool_id: PoolId,
    pub product_id: ProductId,
    pub target_quantity: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberJoined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberJoined {
    pub tenant_id: TenantId,
    pub pool_id: PoolId,
    pub order_id: OrderId,
    pub buyer: UserId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberLeft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberLeft {
    pub tenant_id: TenantId,
    pub pool_id: PoolId,
    pub order_id: OrderId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PoolCompleted. Emitted exactly once, in the same batch as the join
/// that crossed the target. Carries every participating order for fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolCompleted {
    pub tenant_id: TenantId,
    pub pool_id: PoolId,
    pub product_id: ProductId,
    pub total_quantity: i64,
    pub participants: Vec<OrderId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PoolLocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolLocked {
    pub tenant_id: TenantId,
    pub pool_id: PoolId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolEvent {
    PoolOpened(PoolOpened),
    MemberJoined(MemberJoined),
    MemberLeft(MemberLeft),
    PoolLocked(PoolLocked),
    PoolCompleted(PoolCompleted),
}

impl Event for PoolEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PoolEvent::PoolOpened(_) => "pools.pool.opened",
            PoolEvent::MemberJoined(_) => "pools.pool.member_joined",
            PoolEvent::MemberLeft(_) => "pools.pool.member_left",
            PoolEvent::PoolLocked(_) => "pools.pool.locked",
            PoolEvent::PoolCompleted(_) => "pools.pool.completed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PoolEvent::PoolOpened(e) => e.occurred_at,
            PoolEvent::MemberJoined(e) => e.occurred_at,
            PoolEvent::MemberLeft(e) => e.occurred_at,
            PoolEvent::PoolLocked(e) => e.occurred_at,
            PoolEvent::PoolCompleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Pool {
    type Command = PoolCommand;
    type Event = PoolEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PoolEvent::PoolOpened(e) => {
                self.id = e.pool_id;
                self.tenant_id = Some(e.tenant_id);
                self.product_id = Some(e.product_id);
                self.target_quantity = e.target_quantity;
                self.expires_at = e.expires_at;
                self.status = PoolStatus::Open;
                self.created = true;
            }
            PoolEvent::MemberJoined(e) => {
                self.members.push(PoolMember {
                    order_id: e.order_id,
                    buyer: e.buyer,
                    quantity: e.quantity,
                });
                self.committed_quantity += e.quantity;
            }
            PoolEvent::MemberLeft(e) => {
                self.members.retain(|m| m.order_id != e.order_id);
                self.committed_quantity -= e.quantity;
            }
            PoolEvent::PoolLocked(_) => {
                self.status = PoolStatus::Locked;
            }
            PoolEvent::PoolCompleted(_) => {
                self.status = PoolStatus::Completed;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PoolCommand::OpenPool(cmd) => self.handle_open(cmd),
            PoolCommand::JoinPool(cmd) => self.handle_join(cmd),
            PoolCommand::LeavePool(cmd) => self.handle_leave(cmd),
            PoolCommand::LockPool(cmd) => self.handle_lock(cmd),
        }
    }
}

impl Pool {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_pool_id(&self, pool_id: PoolId) -> Result<(), DomainError> {
        if self.id != pool_id {
            return Err(DomainError::invariant("pool_id mismatch"));
        }
        Ok(())
    }

    fn ensure_open(&self, at: DateTime<Utc>) -> Result<(), DomainError> {
        match self.status {
            PoolStatus::Completed => {
                return Err(DomainError::invariant("pool is already completed"));
            }
            PoolStatus::Locked => {
                return Err(DomainError::invariant("pool is locked"));
            }
            PoolStatus::Open => {}
        }
        if let Some(expires_at) = self.expires_at {
            if at >= expires_at {
                return Err(DomainError::invariant("pool has expired"));
            }
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenPool) -> Result<Vec<PoolEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("pool already exists"));
        }
        if cmd.target_quantity <= 0 {
            return Err(DomainError::validation("target_quantity must be positive"));
        }

        Ok(vec![PoolEvent::PoolOpened(PoolOpened {
            tenant_id: cmd.tenant_id,
            pool_id: cmd.pool_id,
            product_id: cmd.product_id,
            target_quantity: cmd.target_quantity,
            expires_at: cmd.expires_at,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_join(&self, cmd: &JoinPool) -> Result<Vec<PoolEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_pool_id(cmd.pool_id)?;
        self.ensure_open(cmd.occurred_at)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if self.members.iter().any(|m| m.order_id == cmd.order_id) {
            return Err(DomainError::conflict("order already in pool"));
        }

        let joined = MemberJoined {
            tenant_id: cmd.tenant_id,
            pool_id: cmd.pool_id,
            order_id: cmd.order_id,
            buyer: cmd.buyer,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        };

        let total = self.committed_quantity + cmd.quantity;
        if total >= self.target_quantity {
            let mut participants: Vec<OrderId> =
                self.members.iter().map(|m| m.order_id).collect();
            participants.push(cmd.order_id);

            return Ok(vec![
                PoolEvent::MemberJoined(joined),
                PoolEvent::PoolCompleted(PoolCompleted {
                    tenant_id: cmd.tenant_id,
                    pool_id: cmd.pool_id,
                    // Invariant: a created pool always has a product.
                    product_id: self.product_id.ok_or_else(|| {
                        DomainError::invariant("pool has no product")
                    })?,
                    total_quantity: total,
                    participants,
                    occurred_at: cmd.occurred_at,
                }),
            ]);
        }

        Ok(vec![PoolEvent::MemberJoined(joined)])
    }

    fn handle_leave(&self, cmd: &LeavePool) -> Result<Vec<PoolEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_pool_id(cmd.pool_id)?;

        if self.status == PoolStatus::Completed {
            return Err(DomainError::invariant(
                "members cannot leave a completed pool",
            ));
        }

        let member = self
            .members
            .iter()
            .find(|m| m.order_id == cmd.order_id)
            .ok_or_else(|| DomainError::invariant("order is not in this pool"))?;

        Ok(vec![PoolEvent::MemberLeft(MemberLeft {
            tenant_id: cmd.tenant_id,
            pool_id: cmd.pool_id,
            order_id: cmd.order_id,
            quantity: member.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_lock(&self, cmd: &LockPool) -> Result<Vec<PoolEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_pool_id(cmd.pool_id)?;

        match self.status {
            PoolStatus::Completed => {
                Err(DomainError::invariant("a completed pool cannot be locked"))
            }
            PoolStatus::Locked => Err(DomainError::conflict("pool is already locked")),
            PoolStatus::Open => Ok(vec![PoolEvent::PoolLocked(PoolLocked {
                tenant_id: cmd.tenant_id,
                pool_id: cmd.pool_id,
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            })]),
        }
    }
}
