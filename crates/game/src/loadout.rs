//! Equip rules: which item sits in which slot.
//!
//! Hands and accessories each have two interchangeable slots. Equipping an
//! item into an occupied slot displaces the occupant; moving an already
//! equipped item onto its sibling slot swaps the two.

use hoard_common::{StateTree, Value, fields};
use hoard_kernel::{StateStore, StoreError, Update, WriteReport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::schema::field;

/// A concrete equipment slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Slot {
    #[serde(rename = "head")]
    Head,
    #[serde(rename = "body")]
    Body,
    #[serde(rename = "legs")]
    Legs,
    #[serde(rename = "hand_1")]
    Hand1,
    #[serde(rename = "hand_2")]
    Hand2,
    #[serde(rename = "accessory_1")]
    Accessory1,
    #[serde(rename = "accessory_2")]
    Accessory2,
}

impl Slot {
    pub fn kind(self) -> SlotKind {
        match self {
            Self::Head => SlotKind::Head,
            Self::Body => SlotKind::Body,
            Self::Legs => SlotKind::Legs,
            Self::Hand1 | Self::Hand2 => SlotKind::Hand,
            Self::Accessory1 | Self::Accessory2 => SlotKind::Accessory,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::Body => "body",
            Self::Legs => "legs",
            Self::Hand1 => "hand_1",
            Self::Hand2 => "hand_2",
            Self::Accessory1 => "accessory_1",
            Self::Accessory2 => "accessory_2",
        }
    }
}

impl std::str::FromStr for Slot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Head,
            Self::Body,
            Self::Legs,
            Self::Hand1,
            Self::Hand2,
            Self::Accessory1,
            Self::Accessory2,
        ]
        .into_iter()
        .find(|slot| slot.as_str() == s)
        .ok_or_else(|| format!("unknown slot: {s}"))
    }
}

/// The kind of slot an item fits, as declared by its catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    Head,
    Body,
    Legs,
    Hand,
    Accessory,
}

impl SlotKind {
    /// Slots of this kind, in fill order.
    pub fn slots(self) -> &'static [Slot] {
        match self {
            Self::Head => &[Slot::Head],
            Self::Body => &[Slot::Body],
            Self::Legs => &[Slot::Legs],
            Self::Hand => &[Slot::Hand1, Slot::Hand2],
            Self::Accessory => &[Slot::Accessory1, Slot::Accessory2],
        }
    }
}

/// Slot -> equipped item id.
pub type Loadout = BTreeMap<Slot, String>;

/// Errors from equip operations.
#[derive(Debug, thiserror::Error)]
pub enum EquipError {
    #[error("item not in catalog: {0}")]
    UnknownItem(String),
    #[error("item cannot be equipped: {0}")]
    NotEquippable(String),
    #[error("item not owned: {0}")]
    NotOwned(String),
    #[error("item {item} does not fit slot {}", slot.as_str())]
    WrongSlot { item: String, slot: Slot },
    #[error("malformed loadout: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Place `item` (of `kind`) into the loadout.
///
/// With no `requested` slot the item goes into the first free slot of its
/// kind, or displaces the first slot's occupant if all are taken. An item
/// already equipped and asked into its sibling slot swaps places with
/// whatever is there.
pub fn equip(
    loadout: &Loadout,
    item: &str,
    kind: SlotKind,
    requested: Option<Slot>,
) -> Result<Loadout, EquipError> {
    if let Some(slot) = requested {
        if slot.kind() != kind {
            return Err(EquipError::WrongSlot {
                item: item.to_string(),
                slot,
            });
        }
    }

    let mut next = loadout.clone();
    let equipped_at = next
        .iter()
        .find(|(_, equipped)| equipped.as_str() == item)
        .map(|(slot, _)| *slot);

    match (equipped_at, requested) {
        (Some(_), None) => {}
        (Some(from), Some(to)) if from == to => {}
        (Some(from), Some(to)) => {
            let displaced = next.insert(to, item.to_string());
            match displaced {
                Some(other) => next.insert(from, other),
                None => next.remove(&from),
            };
        }
        (None, requested) => {
            let slots = kind.slots();
            let target = requested
                .or_else(|| slots.iter().copied().find(|s| !next.contains_key(s)))
                .unwrap_or(slots[0]);
            next.insert(target, item.to_string());
        }
    }
    Ok(next)
}

/// Empty `slot`.
pub fn unequip(loadout: &Loadout, slot: Slot) -> Loadout {
    let mut next = loadout.clone();
    next.remove(&slot);
    next
}

/// Equip an owned catalog item in the store with one write.
///
/// The loadout is read and replaced under the store's writer lock, so a
/// concurrent loadout change is never overwritten.
pub fn equip_in_store(
    store: &StateStore,
    item: &str,
    requested: Option<Slot>,
) -> Result<WriteReport, EquipError> {
    store.update_with(|snapshot| {
        let next = equipped_loadout(snapshot, item, requested)?;
        tracing::debug!(item, ?requested, "equip");
        Ok(Update::new().replace(field::LOADOUT, serde_json::to_value(&next)?))
    })
}

fn equipped_loadout(
    snapshot: &StateTree,
    item: &str,
    requested: Option<Slot>,
) -> Result<Loadout, EquipError> {
    let descriptor = snapshot
        .get(fields::CATALOG)
        .and_then(|catalog| catalog.get(item))
        .ok_or_else(|| EquipError::UnknownItem(item.to_string()))?;
    let kind: SlotKind = descriptor
        .get("slot")
        .and_then(|slot| serde_json::from_value(slot.clone()).ok())
        .ok_or_else(|| EquipError::NotEquippable(item.to_string()))?;

    let owned = snapshot
        .get(field::INVENTORY)
        .and_then(Value::as_array)
        .is_some_and(|items| items.iter().any(|i| i.as_str() == Some(item)));
    if !owned {
        return Err(EquipError::NotOwned(item.to_string()));
    }

    let loadout: Loadout = match snapshot.get(field::LOADOUT) {
        Some(value) => serde_json::from_value(value.clone())?,
        None => Loadout::new(),
    };
    equip(&loadout, item, kind, requested)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::client_schema;
    use hoard_persist::MemoryAdapter;
    use serde_json::json;
    use std::sync::Arc;

    fn loadout(pairs: &[(Slot, &str)]) -> Loadout {
        pairs.iter().map(|(s, i)| (*s, i.to_string())).collect()
    }

    #[test]
    fn fills_first_free_slot() {
        let l = equip(&Loadout::new(), "sword", SlotKind::Hand, None).unwrap();
        assert_eq!(l, loadout(&[(Slot::Hand1, "sword")]));
        let l = equip(&l, "shield", SlotKind::Hand, None).unwrap();
        assert_eq!(l, loadout(&[(Slot::Hand1, "sword"), (Slot::Hand2, "shield")]));
    }

    #[test]
    fn full_kind_displaces_first_slot() {
        let l = loadout(&[(Slot::Hand1, "sword"), (Slot::Hand2, "shield")]);
        let l = equip(&l, "torch", SlotKind::Hand, None).unwrap();
        assert_eq!(l, loadout(&[(Slot::Hand1, "torch"), (Slot::Hand2, "shield")]));
    }

    #[test]
    fn requested_slot_replaces_occupant() {
        let l = loadout(&[(Slot::Hand1, "sword"), (Slot::Hand2, "shield")]);
        let l = equip(&l, "torch", SlotKind::Hand, Some(Slot::Hand2)).unwrap();
        assert_eq!(l, loadout(&[(Slot::Hand1, "sword"), (Slot::Hand2, "torch")]));
    }

    #[test]
    fn moving_equipped_item_swaps() {
        let l = loadout(&[(Slot::Hand1, "sword"), (Slot::Hand2, "shield")]);
        let l = equip(&l, "sword", SlotKind::Hand, Some(Slot::Hand2)).unwrap();
        assert_eq!(l, loadout(&[(Slot::Hand1, "shield"), (Slot::Hand2, "sword")]));
    }

    #[test]
    fn moving_into_empty_sibling_vacates_source() {
        let l = loadout(&[(Slot::Accessory1, "ring")]);
        let l = equip(&l, "ring", SlotKind::Accessory, Some(Slot::Accessory2)).unwrap();
        assert_eq!(l, loadout(&[(Slot::Accessory2, "ring")]));
    }

    #[test]
    fn re_equipping_in_place_is_noop() {
        let l = loadout(&[(Slot::Head, "cap")]);
        assert_eq!(equip(&l, "cap", SlotKind::Head, None).unwrap(), l);
        assert_eq!(equip(&l, "cap", SlotKind::Head, Some(Slot::Head)).unwrap(), l);
    }

    #[test]
    fn wrong_slot_rejected() {
        let err = equip(&Loadout::new(), "cap", SlotKind::Head, Some(Slot::Hand1)).unwrap_err();
        assert!(matches!(err, EquipError::WrongSlot { slot: Slot::Hand1, .. }));
    }

    #[test]
    fn unequip_clears_slot() {
        let l = loadout(&[(Slot::Head, "cap"), (Slot::Legs, "boots")]);
        assert_eq!(unequip(&l, Slot::Head), loadout(&[(Slot::Legs, "boots")]));
    }

    #[test]
    fn slot_names_roundtrip() {
        for slot in [Slot::Head, Slot::Hand2, Slot::Accessory1] {
            assert_eq!(slot.as_str().parse::<Slot>().unwrap(), slot);
            assert_eq!(serde_json::to_value(slot).unwrap(), json!(slot.as_str()));
        }
        assert!("hand".parse::<Slot>().is_err());
    }

    fn store() -> StateStore {
        let store = StateStore::new(client_schema().unwrap(), Arc::new(MemoryAdapter::new()));
        store
            .write(
                Update::new()
                    .replace(
                        fields::CATALOG,
                        json!({
                            "sword": {"slot": "hand"},
                            "shield": {"slot": "hand"},
                            "cap": {"slot": "head"},
                            "potion": {"name": "Potion"},
                        }),
                    )
                    .replace(field::INVENTORY, json!(["sword", "shield", "cap", "potion"])),
            )
            .unwrap();
        store
    }

    #[test]
    fn equip_in_store_is_one_write() {
        let store = store();
        let writes = Arc::new(std::sync::Mutex::new(0));
        let counter = Arc::clone(&writes);
        let _sub = store
            .subscribe(field::LOADOUT, move |_: &hoard_kernel::FieldChange| {
                *counter.lock().unwrap() += 1;
            })
            .unwrap();

        equip_in_store(&store, "sword", None).unwrap();
        equip_in_store(&store, "shield", None).unwrap();
        let report = equip_in_store(&store, "sword", Some(Slot::Hand2)).unwrap();
        assert_eq!(report.changed, [field::LOADOUT]);
        assert_eq!(
            store.read(field::LOADOUT).unwrap(),
            json!({"hand_1": "shield", "hand_2": "sword"})
        );
        assert_eq!(*writes.lock().unwrap(), 3);
    }

    #[test]
    fn concurrent_equips_keep_each_other() {
        let store = Arc::new(store());
        store
            .write(Update::new().replace(
                fields::CATALOG,
                json!({
                    "sword": {"slot": "hand"},
                    "cap": {"slot": "head"},
                    "vest": {"slot": "body"},
                    "boots": {"slot": "legs"},
                }),
            ))
            .unwrap();
        store
            .write(Update::new().replace(field::INVENTORY, json!(["sword", "cap", "vest", "boots"])))
            .unwrap();

        let handles: Vec<_> = ["sword", "cap", "vest", "boots"]
            .into_iter()
            .map(|item| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || equip_in_store(&store, item, None).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(
            store.read(field::LOADOUT).unwrap(),
            json!({"hand_1": "sword", "head": "cap", "body": "vest", "legs": "boots"})
        );
    }

    #[test]
    fn equip_in_store_validates_item() {
        let store = store();
        assert!(matches!(
            equip_in_store(&store, "axe", None),
            Err(EquipError::UnknownItem(_))
        ));
        assert!(matches!(
            equip_in_store(&store, "potion", None),
            Err(EquipError::NotEquippable(_))
        ));
        store
            .write(Update::new().replace(field::INVENTORY, json!(["sword"])))
            .unwrap();
        assert!(matches!(
            equip_in_store(&store, "cap", None),
            Err(EquipError::NotOwned(_))
        ));
    }
}
