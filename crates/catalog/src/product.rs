use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depot_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use depot_events::Event;

/// Product identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Product.
///
/// `current_stock` is sellable quantity; `reserved_stock` is earmarked for
/// orders in processing. Both are non-negative at all times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    tenant_id: Option<TenantId>,
    sku: String,
    name: String,
    /// Minimum order quantity a pool must accumulate before release.
    min_order_quantity: i64,
    current_stock: i64,
    reserved_stock: i64,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            tenant_id: None,
            sku: String::new(),
            name: String::new(),
            min_order_quantity: 1,
            current_stock: 0,
            reserved_stock: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_order_quantity(&self) -> i64 {
        self.min_order_quantity
    }

    pub fn current_stock(&self) -> i64 {
        self.current_stock
    }

    pub fn reserved_stock(&self) -> i64 {
        self.reserved_stock
    }

    pub fn exists(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub min_order_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveStock (inbound goods, grows sellable stock).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveStock (order entered processing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseStock (processing order cancelled, reservation undone).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseStock {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    ReceiveStock(ReceiveStock),
    ReserveStock(ReserveStock),
    ReleaseStock(ReleaseStock),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub min_order_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceived {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReserved (`current -= quantity`, `reserved += quantity`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReserved {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReleased (`current += quantity`, `reserved -= quantity`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReleased {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    StockReceived(StockReceived),
    StockReserved(StockReserved),
    StockReleased(StockReleased),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "catalog.product.created",
            ProductEvent::StockReceived(_) => "catalog.product.stock_received",
            ProductEvent::StockReserved(_) => "catalog.product.stock_reserved",
            ProductEvent::StockReleased(_) => "catalog.product.stock_released",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::StockReceived(e) => e.occurred_at,
            ProductEvent::StockReserved(e) => e.occurred_at,
            ProductEvent::StockReleased(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.tenant_id = Some(e.tenant_id);
                self.sku = e.sku.clone();
                self.name = e.name.clone();
                self.min_order_quantity = e.min_order_quantity;
                self.current_stock = 0;
                self.reserved_stock = 0;
                self.created = true;
            }
            ProductEvent::StockReceived(e) => {
                self.current_stock += e.quantity;
            }
            ProductEvent::StockReserved(e) => {
                self.current_stock -= e.quantity;
                self.reserved_stock += e.quantity;
            }
            ProductEvent::StockReleased(e) => {
                self.current_stock += e.quantity;
                self.reserved_stock -= e.quantity;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::ReceiveStock(cmd) => self.handle_receive(cmd),
            ProductCommand::ReserveStock(cmd) => self.handle_reserve(cmd),
            ProductCommand::ReleaseStock(cmd) => self.handle_release(cmd),
        }
    }
}

impl Product {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn ensure_positive_quantity(quantity: i64) -> Result<(), DomainError> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.min_order_quantity <= 0 {
            return Err(DomainError::validation("min_order_quantity must be positive"));
        }

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            sku: cmd.sku.clone(),
            name: cmd.name.clone(),
            min_order_quantity: cmd.min_order_quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &ReceiveStock) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_product_id(cmd.product_id)?;
        Self::ensure_positive_quantity(cmd.quantity)?;

        Ok(vec![ProductEvent::StockReceived(StockReceived {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve(&self, cmd: &ReserveStock) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_product_id(cmd.product_id)?;
        Self::ensure_positive_quantity(cmd.quantity)?;

        if self.current_stock < cmd.quantity {
            return Err(DomainError::invariant(format!(
                "insufficient stock: {} available, {} requested",
                self.current_stock, cmd.quantity
            )));
        }

        Ok(vec![ProductEvent::StockReserved(StockReserved {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseStock) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_product_id(cmd.product_id)?;
        Self::ensure_positive_quantity(cmd.quantity)?;

        if self.reserved_stock < cmd.quantity {
            return Err(DomainError::invariant(format!(
                "cannot release more than reserved: {} reserved, {} requested",
                self.reserved_stock, cmd.quantity
            )));
        }

        Ok(vec![ProductEvent::StockReleased(StockReleased {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::AggregateId;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created_product(tenant_id: TenantId, product_id: ProductId) -> Product {
        let mut product = Product::empty(product_id);
        let events = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                tenant_id,
                product_id,
                sku: "REBAR-10".to_string(),
                name: "Rebar 10mm".to_string(),
                min_order_quantity: 50,
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);
        product
    }

    fn receive(product: &mut Product, tenant_id: TenantId, quantity: i64) {
        let events = product
            .handle(&ProductCommand::ReceiveStock(ReceiveStock {
                tenant_id,
                product_id: product.id_typed(),
                quantity,
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);
    }

    #[test]
    fn reserve_moves_quantity_between_counters() {
        let tenant_id = test_tenant_id();
        let mut product = created_product(tenant_id, test_product_id());
        receive(&mut product, tenant_id, 100);

        let events = product
            .handle(&ProductCommand::ReserveStock(ReserveStock {
                tenant_id,
                product_id: product.id_typed(),
                quantity: 30,
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);

        assert_eq!(product.current_stock(), 70);
        assert_eq!(product.reserved_stock(), 30);
    }

    #[test]
    fn release_reverses_reserve_exactly() {
        let tenant_id = test_tenant_id();
        let mut product = created_product(tenant_id, test_product_id());
        receive(&mut product, tenant_id, 100);

        for cmd in [
            ProductCommand::ReserveStock(ReserveStock {
                tenant_id,
                product_id: product.id_typed(),
                quantity: 30,
                occurred_at: test_time(),
            }),
            ProductCommand::ReleaseStock(ReleaseStock {
                tenant_id,
                product_id: product.id_typed(),
                quantity: 30,
                occurred_at: test_time(),
            }),
        ] {
            let events = product.handle(&cmd).unwrap();
            product.apply(&events[0]);
        }

        assert_eq!(product.current_stock(), 100);
        assert_eq!(product.reserved_stock(), 0);
    }

    #[test]
    fn cannot_reserve_more_than_current_stock() {
        let tenant_id = test_tenant_id();
        let mut product = created_product(tenant_id, test_product_id());
        receive(&mut product, tenant_id, 10);

        let err = product
            .handle(&ProductCommand::ReserveStock(ReserveStock {
                tenant_id,
                product_id: product.id_typed(),
                quantity: 11,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn cannot_release_more_than_reserved() {
        let tenant_id = test_tenant_id();
        let mut product = created_product(tenant_id, test_product_id());
        receive(&mut product, tenant_id, 10);

        let err = product
            .handle(&ProductCommand::ReleaseStock(ReleaseStock {
                tenant_id,
                product_id: product.id_typed(),
                quantity: 1,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn quantities_must_be_positive() {
        let tenant_id = test_tenant_id();
        let product = created_product(tenant_id, test_product_id());

        for quantity in [0, -5] {
            let err = product
                .handle(&ProductCommand::ReceiveStock(ReceiveStock {
                    tenant_id,
                    product_id: product.id_typed(),
                    quantity,
                    occurred_at: test_time(),
                }))
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn create_validates_sku_and_moq() {
        let product = Product::empty(test_product_id());
        let err = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                tenant_id: test_tenant_id(),
                product_id: test_product_id(),
                sku: "  ".to_string(),
                name: "Rebar".to_string(),
                min_order_quantity: 50,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                tenant_id: test_tenant_id(),
                product_id: test_product_id(),
                sku: "REBAR-10".to_string(),
                name: "Rebar".to_string(),
                min_order_quantity: 0,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: reserve followed by release of the same quantity is an
            /// identity on both stock counters.
            #[test]
            fn reserve_release_is_identity(received in 1i64..10_000, reserved in 1i64..10_000) {
                prop_assume!(reserved <= received);

                let tenant_id = test_tenant_id();
                let mut product = created_product(tenant_id, test_product_id());
                receive(&mut product, tenant_id, received);

                let before = (product.current_stock(), product.reserved_stock());

                for cmd in [
                    ProductCommand::ReserveStock(ReserveStock {
                        tenant_id,
                        product_id: product.id_typed(),
                        quantity: reserved,
                        occurred_at: test_time(),
                    }),
                    ProductCommand::ReleaseStock(ReleaseStock {
                        tenant_id,
                        product_id: product.id_typed(),
                        quantity: reserved,
                        occurred_at: test_time(),
                    }),
                ] {
                    let events = product.handle(&cmd).unwrap();
                    product.apply(&events[0]);
                }

                prop_assert_eq!((product.current_stock(), product.reserved_stock()), before);
            }

            /// Property: stock counters never go negative under valid commands.
            #[test]
            fn counters_stay_non_negative(received in 1i64..1_000, requested in 1i64..2_000) {
                let tenant_id = test_tenant_id();
                let mut product = created_product(tenant_id, test_product_id());
                receive(&mut product, tenant_id, received);

                let cmd = ProductCommand::ReserveStock(ReserveStock {
                    tenant_id,
                    product_id: product.id_typed(),
                    quantity: requested,
                    occurred_at: test_time(),
                });
                if let Ok(events) = product.handle(&cmd) {
                    product.apply(&events[0]);
                }

                prop_assert!(product.current_stock() >= 0);
                prop_assert!(product.reserved_stock() >= 0);
            }
        }
    }
}
