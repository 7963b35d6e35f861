//! w3b-chain
//!
//! Everything that touches the ledger program's wire formats:
//! - `layout`: versioned decoding of the protocol state account
//! - `instruction`: instruction data encoding
//! - `rpc`: the `ChainRpc` seam, state reads and confirmation polling
//! - `http`: JSON-RPC + signing relay client

pub mod http;
pub mod instruction;
pub mod layout;
pub mod rpc;

pub use http::HttpChainClient;
pub use instruction::Instruction;
pub use layout::{LayoutError, LayoutV2, StateLayout};
pub use rpc::{await_confirmation, read_state, ChainError, ChainRpc, SignatureStatus, TxSignature};
