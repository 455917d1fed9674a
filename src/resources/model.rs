//! Ship part shop, inventory and equipment.
//!
//! Purchase and equip are the invariant-bearing operations: both run as a
//! single `BEGIN IMMEDIATE` transaction on a pooled connection, commit on
//! success and roll back on any failure. The credit deduction is a single
//! conditional UPDATE so two concurrent purchases cannot both observe a
//! sufficient balance.

use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use thiserror::Error;

use crate::error::AppError;
use crate::state::DbPool;

#[derive(Debug, Error, PartialEq)]
pub enum ResourceError {
    #[error("Part already owned")]
    AlreadyOwned,

    #[error("Part not found")]
    PartNotFound,

    #[error("Insufficient credits")]
    InsufficientCredits,

    #[error("Part or rank data not found")]
    PartOrRankNotFound,

    #[error("Part already equipped")]
    AlreadyEquipped,

    #[error("Insufficient slot capacity")]
    InsufficientSlots,

    #[error("Inventory entry not found")]
    InventoryNotFound,

    #[error("Part already unequipped")]
    AlreadyUnequipped,

    #[error("Database error: {0}")]
    Sql(String),
}

impl From<rusqlite::Error> for ResourceError {
    fn from(e: rusqlite::Error) -> Self {
        ResourceError::Sql(e.to_string())
    }
}

impl From<r2d2::Error> for ResourceError {
    fn from(e: r2d2::Error) -> Self {
        ResourceError::Sql(e.to_string())
    }
}

impl From<ResourceError> for AppError {
    fn from(e: ResourceError) -> Self {
        match e {
            ResourceError::AlreadyOwned
            | ResourceError::AlreadyEquipped
            | ResourceError::AlreadyUnequipped => AppError::Conflict(e.to_string()),
            ResourceError::PartNotFound
            | ResourceError::PartOrRankNotFound
            | ResourceError::InventoryNotFound => AppError::NotFound(e.to_string()),
            ResourceError::InsufficientCredits | ResourceError::InsufficientSlots => {
                AppError::Insufficient(e.to_string())
            }
            ResourceError::Sql(msg) => AppError::Internal(msg),
        }
    }
}

/// Catalog entry annotated with the caller's ownership.
#[derive(Debug, Clone, Serialize)]
pub struct ShopItem {
    pub part_id: i64,
    pub name: String,
    pub category: Option<String>,
    pub cost: i64,
    pub image_url: Option<String>,
    pub slot_size: i64,
    pub description: Option<String>,
    pub inventory_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InventoryItem {
    pub inventory_id: i64,
    pub part_id: i64,
    pub name: String,
    pub category: Option<String>,
    pub cost: i64,
    pub image_url: Option<String>,
    pub slot_size: i64,
    pub description: Option<String>,
    pub is_equipped: String,
    pub purchased_at: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SlotUsage {
    pub used_slots: i64,
    pub max_slots: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShipView {
    pub user_id: i64,
    pub username: String,
    pub points: i64,
    pub rank_id: i64,
    pub rank_name: String,
    pub max_slots: i64,
    pub used_slots: i64,
    pub available_slots: i64,
    pub base_ship_image: String,
}

/// Whole catalog with the caller's inventory id joined on, owned and unowned
/// alike.
pub fn shop_items(pool: &DbPool, user_id: i64) -> Result<Vec<ShopItem>, ResourceError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT p.id, p.name, p.category, p.cost, p.image_url, p.slot_size, p.description,
                ui.id
         FROM ship_parts p
         LEFT JOIN user_inventory ui ON p.id = ui.part_id AND ui.user_id = ?1
         ORDER BY p.cost DESC",
    )?;
    let items = stmt
        .query_map(params![user_id], |row| {
            Ok(ShopItem {
                part_id: row.get(0)?,
                name: row.get(1)?,
                category: row.get(2)?,
                cost: row.get(3)?,
                image_url: row.get(4)?,
                slot_size: row.get(5)?,
                description: row.get(6)?,
                inventory_id: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

/// Purchase a part. Returns the user's new credit balance.
///
/// Ownership and affordability are both re-checked inside the transaction;
/// the deduction only applies when the balance stays non-negative.
pub fn purchase_part(pool: &DbPool, user_id: i64, part_id: i64) -> Result<i64, ResourceError> {
    let conn = pool.get()?;

    conn.execute("BEGIN IMMEDIATE", [])?;

    let result: Result<i64, ResourceError> = (|| {
        let already_owned: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM user_inventory WHERE user_id = ?1 AND part_id = ?2",
            params![user_id, part_id],
            |row| row.get(0),
        )?;
        if already_owned {
            return Err(ResourceError::AlreadyOwned);
        }

        let cost: i64 = conn
            .query_row(
                "SELECT cost FROM ship_parts WHERE id = ?1",
                params![part_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(ResourceError::PartNotFound)?;

        let updated = conn.execute(
            "UPDATE users SET credits = credits - ?1, updated_at = datetime('now')
             WHERE id = ?2 AND credits >= ?1",
            params![cost, user_id],
        )?;
        if updated == 0 {
            return Err(ResourceError::InsufficientCredits);
        }

        conn.execute(
            "INSERT INTO user_inventory (user_id, part_id) VALUES (?1, ?2)",
            params![user_id, part_id],
        )?;

        let new_credits: i64 = conn.query_row(
            "SELECT credits FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;

        Ok(new_credits)
    })();

    match result {
        Ok(credits) => {
            conn.execute("COMMIT", [])?;
            Ok(credits)
        }
        Err(e) => {
            conn.execute("ROLLBACK", [])?;
            Err(e)
        }
    }
}

pub fn inventory(pool: &DbPool, user_id: i64) -> Result<Vec<InventoryItem>, ResourceError> {
    inventory_query(pool, user_id, false)
}

pub fn equipped(pool: &DbPool, user_id: i64) -> Result<Vec<InventoryItem>, ResourceError> {
    inventory_query(pool, user_id, true)
}

fn inventory_query(
    pool: &DbPool,
    user_id: i64,
    equipped_only: bool,
) -> Result<Vec<InventoryItem>, ResourceError> {
    let conn = pool.get()?;
    let filter = if equipped_only {
        " AND ui.is_equipped = 'equipped'"
    } else {
        ""
    };
    let sql = format!(
        "SELECT ui.id, p.id, p.name, p.category, p.cost, p.image_url, p.slot_size,
                p.description, ui.is_equipped, ui.purchased_at
         FROM user_inventory ui
         JOIN ship_parts p ON ui.part_id = p.id
         WHERE ui.user_id = ?1{filter}
         ORDER BY p.cost DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(params![user_id], |row| {
            Ok(InventoryItem {
                inventory_id: row.get(0)?,
                part_id: row.get(1)?,
                name: row.get(2)?,
                category: row.get(3)?,
                cost: row.get(4)?,
                image_url: row.get(5)?,
                slot_size: row.get(6)?,
                description: row.get(7)?,
                is_equipped: row.get(8)?,
                purchased_at: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

/// Equip an owned part, subject to the slot capacity of the user's rank.
///
/// One SELECT resolves the four values the decision needs: the part's slot
/// size within this user's inventory, its current equipped status, the summed
/// size of the user's other equipped parts, and the max slots of the rank
/// with the greatest min_points not above the user's points.
pub fn equip_part(pool: &DbPool, user_id: i64, part_id: i64) -> Result<SlotUsage, ResourceError> {
    let conn = pool.get()?;

    conn.execute("BEGIN IMMEDIATE", [])?;

    let result: Result<SlotUsage, ResourceError> = (|| {
        let (slot_size, status, equipped_total, max_slots): (
            Option<i64>,
            Option<String>,
            i64,
            Option<i64>,
        ) = conn.query_row(
            "SELECT
               (SELECT p.slot_size FROM ship_parts p
                  JOIN user_inventory ui ON p.id = ui.part_id
                  WHERE ui.part_id = ?1 AND ui.user_id = ?2),
               (SELECT ui.is_equipped FROM user_inventory ui
                  WHERE ui.part_id = ?1 AND ui.user_id = ?2),
               (SELECT IFNULL(SUM(p.slot_size), 0) FROM ship_parts p
                  JOIN user_inventory ui ON p.id = ui.part_id
                  WHERE p.id != ?1 AND ui.user_id = ?2 AND ui.is_equipped = 'equipped'),
               (SELECT r.max_slots FROM ranks r
                  JOIN users u ON u.points >= r.min_points
                  WHERE u.id = ?2
                  ORDER BY r.min_points DESC LIMIT 1)",
            params![part_id, user_id],
            |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            },
        )?;

        let (slot_size, max_slots) = match (slot_size, max_slots) {
            (Some(s), Some(m)) => (s, m),
            _ => return Err(ResourceError::PartOrRankNotFound),
        };

        if status.as_deref() == Some("equipped") {
            return Err(ResourceError::AlreadyEquipped);
        }

        if slot_size + equipped_total > max_slots {
            return Err(ResourceError::InsufficientSlots);
        }

        conn.execute(
            "UPDATE user_inventory SET is_equipped = 'equipped'
             WHERE part_id = ?1 AND user_id = ?2",
            params![part_id, user_id],
        )?;

        Ok(SlotUsage {
            used_slots: slot_size + equipped_total,
            max_slots,
        })
    })();

    match result {
        Ok(usage) => {
            conn.execute("COMMIT", [])?;
            Ok(usage)
        }
        Err(e) => {
            conn.execute("ROLLBACK", [])?;
            Err(e)
        }
    }
}

/// Unequip by inventory id. No capacity check on the way out.
pub fn unequip_part(pool: &DbPool, user_id: i64, inventory_id: i64) -> Result<(), ResourceError> {
    let conn = pool.get()?;

    let updated = conn.execute(
        "UPDATE user_inventory SET is_equipped = 'unequipped'
         WHERE id = ?1 AND user_id = ?2 AND is_equipped = 'equipped'",
        params![inventory_id, user_id],
    )?;
    if updated > 0 {
        return Ok(());
    }

    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM user_inventory WHERE id = ?1 AND user_id = ?2",
        params![inventory_id, user_id],
        |row| row.get(0),
    )?;
    if exists {
        Err(ResourceError::AlreadyUnequipped)
    } else {
        Err(ResourceError::InventoryNotFound)
    }
}

/// The user's ship: rank-derived hull image plus slot usage.
pub fn ship(pool: &DbPool, user_id: i64) -> Result<ShipView, ResourceError> {
    let conn = pool.get()?;

    conn.query_row(
        "SELECT u.id, u.username, u.points, r.id, r.name, r.max_slots,
            (SELECT IFNULL(SUM(p.slot_size), 0) FROM ship_parts p
               JOIN user_inventory ui ON p.id = ui.part_id
               WHERE ui.user_id = ?1 AND ui.is_equipped = 'equipped')
         FROM users u
         JOIN ranks r ON u.points >= r.min_points
         WHERE u.id = ?1
         ORDER BY r.min_points DESC
         LIMIT 1",
        params![user_id],
        |row| {
            let rank_id: i64 = row.get(3)?;
            let max_slots: i64 = row.get(5)?;
            let used_slots: i64 = row.get(6)?;
            Ok(ShipView {
                user_id: row.get(0)?,
                username: row.get(1)?,
                points: row.get(2)?,
                rank_id,
                rank_name: row.get(4)?,
                max_slots,
                used_slots,
                available_slots: max_slots - used_slots,
                base_ship_image: format!("ships/ship{}.png", rank_id),
            })
        },
    )
    .optional()?
    .ok_or(ResourceError::PartOrRankNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{seed_user, test_pool};
    use rusqlite::params;

    // Seeded catalog: part 1 = Ion Thruster (100cr, slot 2),
    // part 2 = Titanium Plating (250cr, slot 4), part 3 = Plasma Cannon (500cr, slot 100)

    fn credits_of(pool: &DbPool, user_id: i64) -> i64 {
        let conn = pool.get().unwrap();
        conn.query_row(
            "SELECT credits FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .unwrap()
    }

    fn inventory_count(pool: &DbPool, user_id: i64) -> i64 {
        let conn = pool.get().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM user_inventory WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn purchase_deducts_cost_and_creates_unequipped_row() {
        let pool = test_pool();
        let user = seed_user(&pool, "buyer", 0, 100);

        let new_credits = purchase_part(&pool, user, 1).unwrap();
        assert_eq!(new_credits, 0);
        assert_eq!(credits_of(&pool, user), 0);

        let conn = pool.get().unwrap();
        let status: String = conn
            .query_row(
                "SELECT is_equipped FROM user_inventory WHERE user_id = ?1 AND part_id = 1",
                params![user],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(status, "unequipped");
    }

    #[test]
    fn double_purchase_fails_with_already_owned() {
        let pool = test_pool();
        let user = seed_user(&pool, "buyer", 0, 300);

        purchase_part(&pool, user, 1).unwrap();
        let err = purchase_part(&pool, user, 1).unwrap_err();
        assert_eq!(err, ResourceError::AlreadyOwned);
        // First purchase stands, nothing was double-charged
        assert_eq!(credits_of(&pool, user), 200);
        assert_eq!(inventory_count(&pool, user), 1);
    }

    #[test]
    fn purchase_with_insufficient_credits_changes_nothing() {
        let pool = test_pool();
        let user = seed_user(&pool, "broke", 0, 99);

        let err = purchase_part(&pool, user, 1).unwrap_err();
        assert_eq!(err, ResourceError::InsufficientCredits);
        assert_eq!(credits_of(&pool, user), 99);
        assert_eq!(inventory_count(&pool, user), 0);
    }

    #[test]
    fn purchase_of_unknown_part_fails() {
        let pool = test_pool();
        let user = seed_user(&pool, "buyer", 0, 100);

        let err = purchase_part(&pool, user, 999).unwrap_err();
        assert_eq!(err, ResourceError::PartNotFound);
        assert_eq!(credits_of(&pool, user), 100);
    }

    #[test]
    fn equip_within_capacity_succeeds() {
        let pool = test_pool();
        // Recruit rank: max_slots = 5
        let user = seed_user(&pool, "recruit", 0, 1000);
        purchase_part(&pool, user, 1).unwrap(); // slot 2

        let usage = equip_part(&pool, user, 1).unwrap();
        assert_eq!(
            usage,
            SlotUsage {
                used_slots: 2,
                max_slots: 5
            }
        );
    }

    #[test]
    fn equip_over_capacity_fails_and_changes_nothing() {
        let pool = test_pool();
        let user = seed_user(&pool, "recruit", 0, 1000);
        purchase_part(&pool, user, 1).unwrap(); // slot 2
        purchase_part(&pool, user, 2).unwrap(); // slot 4
        equip_part(&pool, user, 1).unwrap();

        // 2 + 4 > 5
        let err = equip_part(&pool, user, 2).unwrap_err();
        assert_eq!(err, ResourceError::InsufficientSlots);

        let conn = pool.get().unwrap();
        let status: String = conn
            .query_row(
                "SELECT is_equipped FROM user_inventory WHERE user_id = ?1 AND part_id = 2",
                params![user],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(status, "unequipped");
    }

    #[test]
    fn higher_rank_unlocks_more_slots() {
        let pool = test_pool();
        // Pilot rank at 500 points: max_slots = 10
        let user = seed_user(&pool, "pilot", 500, 1000);
        purchase_part(&pool, user, 1).unwrap();
        purchase_part(&pool, user, 2).unwrap();

        equip_part(&pool, user, 1).unwrap();
        let usage = equip_part(&pool, user, 2).unwrap();
        assert_eq!(
            usage,
            SlotUsage {
                used_slots: 6,
                max_slots: 10
            }
        );
    }

    #[test]
    fn equip_unowned_part_fails() {
        let pool = test_pool();
        let user = seed_user(&pool, "recruit", 0, 1000);

        let err = equip_part(&pool, user, 1).unwrap_err();
        assert_eq!(err, ResourceError::PartOrRankNotFound);
    }

    #[test]
    fn equip_twice_fails_with_already_equipped() {
        let pool = test_pool();
        let user = seed_user(&pool, "recruit", 0, 1000);
        purchase_part(&pool, user, 1).unwrap();
        equip_part(&pool, user, 1).unwrap();

        let err = equip_part(&pool, user, 1).unwrap_err();
        assert_eq!(err, ResourceError::AlreadyEquipped);
    }

    #[test]
    fn unequip_then_equip_again() {
        let pool = test_pool();
        let user = seed_user(&pool, "recruit", 0, 1000);
        purchase_part(&pool, user, 1).unwrap();
        equip_part(&pool, user, 1).unwrap();

        let conn = pool.get().unwrap();
        let inventory_id: i64 = conn
            .query_row(
                "SELECT id FROM user_inventory WHERE user_id = ?1 AND part_id = 1",
                params![user],
                |row| row.get(0),
            )
            .unwrap();
        drop(conn);

        unequip_part(&pool, user, inventory_id).unwrap();
        let err = unequip_part(&pool, user, inventory_id).unwrap_err();
        assert_eq!(err, ResourceError::AlreadyUnequipped);

        equip_part(&pool, user, 1).unwrap();
    }

    #[test]
    fn unequip_unknown_inventory_id_fails() {
        let pool = test_pool();
        let user = seed_user(&pool, "recruit", 0, 1000);

        let err = unequip_part(&pool, user, 12345).unwrap_err();
        assert_eq!(err, ResourceError::InventoryNotFound);
    }

    #[test]
    fn unequip_someone_elses_part_fails() {
        let pool = test_pool();
        let owner = seed_user(&pool, "owner", 0, 1000);
        let other = seed_user(&pool, "other", 0, 1000);
        purchase_part(&pool, owner, 1).unwrap();
        equip_part(&pool, owner, 1).unwrap();

        let conn = pool.get().unwrap();
        let inventory_id: i64 = conn
            .query_row(
                "SELECT id FROM user_inventory WHERE user_id = ?1",
                params![owner],
                |row| row.get(0),
            )
            .unwrap();
        drop(conn);

        let err = unequip_part(&pool, other, inventory_id).unwrap_err();
        assert_eq!(err, ResourceError::InventoryNotFound);
    }

    #[test]
    fn shop_splits_by_ownership() {
        let pool = test_pool();
        let user = seed_user(&pool, "buyer", 0, 100);
        purchase_part(&pool, user, 1).unwrap();

        let items = shop_items(&pool, user).unwrap();
        assert_eq!(items.len(), 3);
        let owned: Vec<_> = items.iter().filter(|i| i.inventory_id.is_some()).collect();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].part_id, 1);
    }

    #[test]
    fn inventory_and_equipped_listings() {
        let pool = test_pool();
        let user = seed_user(&pool, "buyer", 0, 400);
        purchase_part(&pool, user, 1).unwrap();
        purchase_part(&pool, user, 2).unwrap();
        equip_part(&pool, user, 1).unwrap();

        assert_eq!(inventory(&pool, user).unwrap().len(), 2);
        let eq = equipped(&pool, user).unwrap();
        assert_eq!(eq.len(), 1);
        assert_eq!(eq[0].part_id, 1);
    }

    #[test]
    fn ship_reports_rank_and_slot_usage() {
        let pool = test_pool();
        let user = seed_user(&pool, "pilot", 600, 400);
        purchase_part(&pool, user, 1).unwrap();
        equip_part(&pool, user, 1).unwrap();

        let ship = ship(&pool, user).unwrap();
        assert_eq!(ship.rank_name, "Pilot");
        assert_eq!(ship.max_slots, 10);
        assert_eq!(ship.used_slots, 2);
        assert_eq!(ship.available_slots, 8);
        assert_eq!(ship.base_ship_image, "ships/ship2.png");
    }
}
