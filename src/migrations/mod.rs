mod m0001_pages;
mod m0002_corrections;
mod m0003_reprocess_queue;
mod m0004_cost_ledger;

use cetane::prelude::MigrationRegistry;

pub fn registry() -> MigrationRegistry {
    let mut reg = MigrationRegistry::new();
    reg.register(m0001_pages::migration());
    reg.register(m0002_corrections::migration());
    reg.register(m0003_reprocess_queue::migration());
    reg.register(m0004_cost_ledger::migration());
    reg
}
