//! Persistent economy: where secured loot ends up

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use super::supabase::SupabaseClient;

/// Credits a player's persistent balance. Calls come from inside the match
/// tick, so implementations must return immediately and do any I/O in the
/// background.
pub trait Economy: Send + Sync {
    fn credit_balance(&self, user_id: Uuid, amount: u64);
}

/// In-process balances, used when no remote ledger is configured
#[derive(Debug, Default)]
pub struct LedgerEconomy {
    balances: RwLock<HashMap<Uuid, u64>>,
}

impl LedgerEconomy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, user_id: Uuid) -> u64 {
        self.balances.read().get(&user_id).copied().unwrap_or(0)
    }
}

impl Economy for LedgerEconomy {
    fn credit_balance(&self, user_id: Uuid, amount: u64) {
        if amount == 0 {
            return;
        }
        let mut balances = self.balances.write();
        let balance = balances.entry(user_id).or_insert(0);
        *balance += amount;
        info!(user_id = %user_id, amount, balance = *balance, "Credited balance");
    }
}

#[derive(Debug, Serialize)]
struct CreditArgs {
    p_user_id: Uuid,
    p_amount: u64,
}

/// Balances kept in Supabase, credited through the `credit_balance` RPC
#[derive(Clone)]
pub struct RemoteEconomy {
    client: SupabaseClient,
}

impl RemoteEconomy {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

impl Economy for RemoteEconomy {
    fn credit_balance(&self, user_id: Uuid, amount: u64) {
        if amount == 0 {
            return;
        }
        let client = self.client.clone();
        // Fire-and-forget; the tick never waits on the network.
        tokio::spawn(async move {
            let args = CreditArgs {
                p_user_id: user_id,
                p_amount: amount,
            };
            match client.rpc("credit_balance", &args).await {
                Ok(()) => info!(user_id = %user_id, amount, "Credited remote balance"),
                Err(e) => error!(user_id = %user_id, amount, error = %e, "Failed to credit balance"),
            }
        });
    }
}

/// Shared handle passed into every match
pub type SharedEconomy = Arc<dyn Economy>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_accumulates_per_user() {
        let ledger = LedgerEconomy::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        ledger.credit_balance(alice, 10);
        ledger.credit_balance(alice, 5);
        ledger.credit_balance(bob, 0);

        assert_eq!(ledger.balance(alice), 15);
        assert_eq!(ledger.balance(bob), 0);
    }

    #[test]
    fn test_credit_args_match_rpc_signature() {
        let user = Uuid::nil();
        let json = serde_json::to_value(CreditArgs {
            p_user_id: user,
            p_amount: 7,
        })
        .unwrap();
        assert_eq!(json["p_amount"], 7);
        assert_eq!(json["p_user_id"], user.to_string());
    }

    #[tokio::test]
    async fn test_remote_credit_does_not_block_caller() {
        // Unroutable address: the spawned request fails in the background,
        // the call itself returns immediately.
        let economy = RemoteEconomy::new(SupabaseClient::new("http://127.0.0.1:9", "key"));
        economy.credit_balance(Uuid::new_v4(), 3);
        tokio::task::yield_now().await;
    }
}
