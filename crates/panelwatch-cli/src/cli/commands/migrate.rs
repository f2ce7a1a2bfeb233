use super::{exit_codes, load};
use crate::cli::args::MigrateArgs;
use anyhow::Result;
use panelwatch_core::storage::schema;
use panelwatch_core::Store;

pub fn cmd_migrate(args: MigrateArgs) -> Result<i32> {
    let cfg = load(&args.config.config)?;
    let db_path = args.db.unwrap_or(cfg.storage.db_path);

    let store = Store::open(&db_path)?;
    let before = store.schema_version()?;
    let target = schema::latest_version();

    if args.check {
        // A fresh file has no table yet and also needs migrating.
        let has_table = !store.table_columns("analyses")?.is_empty();
        if before < target || !has_table {
            println!(
                "Migration needed: {} is at schema v{} (latest v{})",
                db_path.display(),
                before,
                target
            );
            return Ok(exit_codes::CONFIG_ERROR);
        }
        println!("Schema up to date (v{})", before);
        return Ok(exit_codes::OK);
    }

    store.init_schema()?;
    let after = store.schema_version()?;
    if after == before {
        println!("Schema already at v{}: {}", after, db_path.display());
    } else {
        println!("Migrated {} from v{} to v{}", db_path.display(), before, after);
    }
    Ok(exit_codes::OK)
}
