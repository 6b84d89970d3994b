//! External persistence: the economy ledger

pub mod economy;
pub mod supabase;

pub use economy::{Economy, LedgerEconomy, RemoteEconomy, SharedEconomy};
pub use supabase::SupabaseClient;
