//! `depot-pools` — group-buy pools.
//!
//! A pool accumulates committed quantity for a single product across many
//! buyers' orders. The moment committed quantity reaches the target, the pool
//! completes, exactly once, and the completion event carries every
//! participating order so downstream processing can fan out.

pub mod pool;

pub use pool::{
    JoinPool, LeavePool, LockPool, MemberJoined, MemberLeft, OpenPool, Pool, PoolCommand,
    PoolCompleted, PoolEvent, PoolId, PoolLocked, PoolMember, PoolOpened, PoolStatus,
};
