pub mod account;
pub mod call;
pub mod operation;
pub mod userop;

pub use account::{AccountImplementation, OwnerMaterial, SmartAccountHandle};
pub use call::{Call, GasParameters};
pub use operation::{
    InvalidTransition, OperationId, OperationStatus, PendingOperation, StatusRecord,
    StatusSnapshot,
};
pub use userop::{PreparedOperation, UserOpError, compute_user_op_v07_hash};
