//! SQLite-Implementierung des ChargePointRepository

use async_trait::async_trait;
use chrono::Utc;

use crate::error::DbError;
use crate::models::{LadepunktRecord, LadepunktUpdate, NeuerLadepunkt};
use crate::repository::{ChargePointRepository, DbResult};
use crate::sqlite::pool::SqliteDb;

const SPALTEN: &str = "id, name, address, phone, server_address, authorization_key, username, created_at, updated_at";

fn eindeutigkeit_pruefen(e: sqlx::Error, username: &str) -> DbError {
    let msg = e.to_string();
    if msg.contains("UNIQUE") || msg.contains("unique") {
        DbError::Eindeutigkeit(format!("Benutzername '{username}' bereits vergeben"))
    } else {
        DbError::Sqlx(e)
    }
}

#[async_trait]
impl ChargePointRepository for SqliteDb {
    async fn list(&self) -> DbResult<Vec<LadepunktRecord>> {
        let sql = format!("SELECT {SPALTEN} FROM charge_points ORDER BY id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_ladepunkt).collect()
    }

    async fn get_by_id(&self, id: i64) -> DbResult<Option<LadepunktRecord>> {
        let sql = format!("SELECT {SPALTEN} FROM charge_points WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_ladepunkt(&r)).transpose()
    }

    async fn get_by_username(&self, username: &str) -> DbResult<Option<LadepunktRecord>> {
        let sql = format!("SELECT {SPALTEN} FROM charge_points WHERE username = ?");
        let row = sqlx::query(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_ladepunkt(&r)).transpose()
    }

    async fn create(&self, data: NeuerLadepunkt<'_>) -> DbResult<LadepunktRecord> {
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let id = sqlx::query(
            "INSERT INTO charge_points
                (name, address, phone, server_address, authorization_key, username, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(data.name)
        .bind(data.address)
        .bind(data.phone)
        .bind(data.server_address)
        .bind(data.authorization_key)
        .bind(data.username)
        .bind(&now_str)
        .bind(&now_str)
        .execute(&self.pool)
        .await
        .map_err(|e| eindeutigkeit_pruefen(e, data.username))?
        .last_insert_rowid();

        Ok(LadepunktRecord {
            id,
            name: data.name.to_string(),
            address: data.address.to_string(),
            phone: data.phone.to_string(),
            server_address: data.server_address.to_string(),
            authorization_key: data.authorization_key.to_string(),
            username: data.username.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn update(&self, id: i64, data: LadepunktUpdate) -> DbResult<LadepunktRecord> {
        if data.ist_leer() {
            return self
                .get_by_id(id)
                .await?
                .ok_or_else(|| DbError::nicht_gefunden(format!("Ladepunkt {id}")));
        }

        // Dynamisches UPDATE – nur gesetzte Felder aendern
        let felder = [
            ("name", &data.name),
            ("address", &data.address),
            ("phone", &data.phone),
            ("server_address", &data.server_address),
            ("authorization_key", &data.authorization_key),
            ("username", &data.username),
        ];

        let mut sets: Vec<String> = felder
            .iter()
            .filter(|(_, wert)| wert.is_some())
            .map(|(spalte, _)| format!("{spalte} = ?"))
            .collect();
        sets.push("updated_at = ?".to_string());

        let sql = format!("UPDATE charge_points SET {} WHERE id = ?", sets.join(", "));
        let mut q = sqlx::query(&sql);
        for (_, wert) in felder.iter() {
            if let Some(v) = wert {
                q = q.bind(v.as_str());
            }
        }
        q = q.bind(Utc::now().to_rfc3339()).bind(id);

        let username = data.username.as_deref().unwrap_or_default();
        let affected = q
            .execute(&self.pool)
            .await
            .map_err(|e| eindeutigkeit_pruefen(e, username))?
            .rows_affected();
        if affected == 0 {
            return Err(DbError::nicht_gefunden(format!("Ladepunkt {id}")));
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::intern("Ladepunkt nach Update nicht gefunden"))
    }

    async fn delete(&self, id: i64) -> DbResult<bool> {
        let affected = sqlx::query("DELETE FROM charge_points WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn row_to_ladepunkt(row: &sqlx::sqlite::SqliteRow) -> DbResult<LadepunktRecord> {
    use sqlx::Row as _;

    Ok(LadepunktRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        phone: row.try_get("phone")?,
        server_address: row.try_get("server_address")?,
        authorization_key: row.try_get("authorization_key")?,
        username: row.try_get("username")?,
        created_at: zeitpunkt(row, "created_at")?,
        updated_at: zeitpunkt(row, "updated_at")?,
    })
}

fn zeitpunkt(
    row: &sqlx::sqlite::SqliteRow,
    spalte: &str,
) -> DbResult<chrono::DateTime<Utc>> {
    use sqlx::Row as _;

    let wert: String = row.try_get(spalte)?;
    chrono::DateTime::parse_from_rfc3339(&wert)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::intern(format!("Ungueltige {spalte} '{wert}': {e}")))
}
