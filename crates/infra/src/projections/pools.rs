use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use depot_catalog::ProductId;
use depot_core::{TenantId, UserId};
use depot_events::EventEnvelope;
use depot_orders::OrderId;
use depot_pools::{PoolEvent, PoolId, PoolStatus};

use super::cursor::CursorCheck;
use super::{ProjectionCursors, ProjectionError};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolMemberReadModel {
    pub order_id: OrderId,
    pub buyer: UserId,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolReadModel {
    pub pool_id: PoolId,
    pub product_id: ProductId,
    pub status: PoolStatus,
    pub target_quantity: i64,
    pub committed_quantity: i64,
    pub members: Vec<PoolMemberReadModel>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct PoolsProjection<S>
where
    S: TenantStore<PoolId, PoolReadModel>,
{
    store: S,
    cursors: ProjectionCursors,
}

impl<S> PoolsProjection<S>
where
    S: TenantStore<PoolId, PoolReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: ProjectionCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, pool_id: &PoolId) -> Option<PoolReadModel> {
        self.store.get(tenant_id, pool_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<PoolReadModel> {
        self.store.list(tenant_id)
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != "pools.pool" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        match self.cursors.check(tenant_id, aggregate_id, seq)? {
            CursorCheck::Duplicate => return Ok(()),
            CursorCheck::Apply => {}
        }

        let ev: PoolEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, pool_id) = match &ev {
            PoolEvent::PoolOpened(e) => (e.tenant_id, e.pool_id),
            PoolEvent::MemberJoined(e) => (e.tenant_id, e.pool_id),
            PoolEvent::MemberLeft(e) => (e.tenant_id, e.pool_id),
            PoolEvent::PoolLocked(e) => (e.tenant_id, e.pool_id),
            PoolEvent::PoolCompleted(e) => (e.tenant_id, e.pool_id),
        };

        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if pool_id.0 != aggregate_id {
            return Err(ProjectionError::TenantIsolation(
                "event pool_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            PoolEvent::PoolOpened(e) => {
                self.store.upsert(
                    tenant_id,
                    e.pool_id,
                    PoolReadModel {
                        pool_id: e.pool_id,
                        product_id: e.product_id,
                        status: PoolStatus::Open,
                        target_quantity: e.target_quantity,
                        committed_quantity: 0,
                        members: vec![],
                        expires_at: e.expires_at,
                    },
                );
            }
            PoolEvent::MemberJoined(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.pool_id) {
                    rm.committed_quantity += e.quantity;
                    rm.members.push(PoolMemberReadModel {
                        order_id: e.order_id,
                        buyer: e.buyer,
                        quantity: e.quantity,
                    });
                    self.store.upsert(tenant_id, e.pool_id, rm);
                }
            }
            PoolEvent::MemberLeft(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.pool_id) {
                    rm.committed_quantity -= e.quantity;
                    rm.members.retain(|m| m.order_id != e.order_id);
                    self.store.upsert(tenant_id, e.pool_id, rm);
                }
            }
            PoolEvent::PoolLocked(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.pool_id) {
                    rm.status = PoolStatus::Locked;
                    self.store.upsert(tenant_id, e.pool_id, rm);
                }
            }
            PoolEvent::PoolCompleted(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.pool_id) {
                    rm.status = PoolStatus::Completed;
                    self.store.upsert(tenant_id, e.pool_id, rm);
                }
            }
        }

        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }
}
