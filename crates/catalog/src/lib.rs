//! `depot-catalog` — product catalog + stock ledger.
//!
//! Each product tracks two counters: sellable `current_stock` and
//! `reserved_stock` earmarked for processing orders. Order status transitions
//! move quantity between the two; they never create or destroy stock.

pub mod product;

pub use product::{
    CreateProduct, Product, ProductCommand, ProductCreated, ProductEvent, ProductId,
    ReceiveStock, ReleaseStock, ReserveStock, StockReceived, StockReleased, StockReserved,
};
