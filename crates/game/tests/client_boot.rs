use hoard_boot::{Bootstrap, Catalog, IdentitySource, StaticCatalog};
use hoard_common::{SystemInfo, fields};
use hoard_game::migrations::{
    FIX_DEDUPE_INVENTORY, LOADOUT_SLOTS_V2, RETIRED_DEDUPE_INVENTORY_V1, SEED_XP,
};
use hoard_game::{EquipError, Slot, client_migrations, client_schema, equip_in_store, field};
use hoard_persist::{MemoryAdapter, PersistenceAdapter};
use serde_json::json;
use std::sync::Arc;

fn catalog() -> Catalog {
    [
        ("sword", json!({"slot": "hand"})),
        ("shield", json!({"slot": "hand"})),
        ("ring", json!({"slot": "accessory"})),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn boot(adapter: Arc<MemoryAdapter>) -> hoard_boot::Booted {
    let bootstrap = Bootstrap::new(client_schema().unwrap(), adapter)
        .migrations(client_migrations().unwrap())
        .catalog(StaticCatalog(catalog()))
        .probe(|| -> Option<SystemInfo> { None });
    pollster::block_on(bootstrap.run()).unwrap()
}

#[test]
fn fresh_install_boots_to_defaults() {
    let adapter = Arc::new(MemoryAdapter::new());
    let booted = boot(adapter.clone());

    assert_eq!(booted.report.identity_source, IdentitySource::Generated);
    assert_eq!(booted.store.read(field::XP).unwrap(), json!(100));
    assert_eq!(
        booted.store.read(field::SESSION).unwrap(),
        json!({"screen": "title"})
    );
    assert_eq!(booted.store.read(fields::CATALOG).unwrap()["ring"]["slot"], "accessory");
    // transient fields never reach the adapter
    assert!(adapter.get(field::SESSION).unwrap().is_none());
    assert!(adapter.get(fields::CATALOG).unwrap().is_none());
    assert_eq!(adapter.get(field::XP).unwrap(), Some(json!(100)));
}

#[test]
fn legacy_install_is_upgraded_then_stable() {
    let adapter = Arc::new(MemoryAdapter::new());
    adapter
        .set(
            fields::MIGRATIONS,
            &json!({ RETIRED_DEDUPE_INVENTORY_V1: true }),
        )
        .unwrap();
    adapter.set(fields::IDENTITY, &json!("player-7")).unwrap();
    adapter.set(field::XP, &json!(0)).unwrap();
    adapter.set(field::INVENTORY, &json!(["ring"])).unwrap();
    adapter
        .set(field::LOADOUT, &json!({"hand": "sword", "accessory": "ring"}))
        .unwrap();

    let booted = boot(adapter.clone());
    assert_eq!(booted.report.identity, "player-7");
    assert_eq!(booted.report.identity_source, IdentitySource::Stored);
    assert_eq!(
        booted.report.applied_migrations,
        [
            "adopt_legacy_identity",
            SEED_XP,
            LOADOUT_SLOTS_V2,
            FIX_DEDUPE_INVENTORY
        ]
    );
    assert_eq!(
        adapter.get(field::LOADOUT).unwrap(),
        Some(json!({"hand_1": "sword", "accessory_1": "ring"}))
    );
    assert_eq!(
        adapter.get(field::INVENTORY).unwrap(),
        Some(json!(["ring", "sword"]))
    );
    drop(booted);

    let writes = adapter.write_count();
    let again = boot(adapter.clone());
    assert!(again.report.applied_migrations.is_empty());
    assert_eq!(adapter.write_count(), writes);
}

#[test]
fn equip_after_boot_persists_loadout() {
    let adapter = Arc::new(MemoryAdapter::new());
    adapter
        .set(field::INVENTORY, &json!(["sword", "shield"]))
        .unwrap();
    let booted = boot(adapter.clone());

    equip_in_store(&booted.store, "sword", None).unwrap();
    equip_in_store(&booted.store, "shield", None).unwrap();
    equip_in_store(&booted.store, "shield", Some(Slot::Hand1)).unwrap();
    assert_eq!(
        adapter.get(field::LOADOUT).unwrap(),
        Some(json!({"hand_1": "shield", "hand_2": "sword"}))
    );

    assert!(matches!(
        equip_in_store(&booted.store, "ring", None),
        Err(EquipError::NotOwned(_))
    ));
}
