//! SQLite implementation of the pseudo store port.
//!
//! # Invariants
//! - Connections must be fully migrated before a store can be built.
//! - Read paths reject rows whose checksum no longer matches the content.
//! - Membership writes run inside one transaction.

use crate::db::migrations::{current_user_version, latest_version};
use crate::model::node::{NodeId, PseudoNode};
use crate::repo::pseudo_store::{GroupId, GroupRecord, PseudoStore, StoreError, StoreResult};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use uuid::Uuid;

const NODE_SELECT_SQL: &str = "SELECT
    n.uuid,
    n.node_type,
    n.filename,
    n.element,
    n.checksum,
    n.content
FROM nodes n";

/// SQLite-backed pseudo store.
pub struct SqlitePseudoStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePseudoStore<'conn> {
    /// Builds a store over a connection opened with `open_db*`.
    ///
    /// # Errors
    /// - `UninitializedConnection` when the schema is not at the latest version.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        let actual_version = current_user_version(conn)?;
        let expected_version = latest_version();
        if actual_version != expected_version {
            return Err(StoreError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self { conn })
    }

    fn query_nodes(&self, sql: &str, params: impl rusqlite::Params) -> StoreResult<Vec<PseudoNode>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next()? {
            nodes.push(parse_node_row(row)?);
        }
        Ok(nodes)
    }
}

impl PseudoStore for SqlitePseudoStore<'_> {
    fn find_group(&self, type_string: &str, label: &str) -> StoreResult<Option<GroupRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT uuid, type_string, label, description
                 FROM groups
                 WHERE type_string = ?1
                   AND label = ?2;",
                params![type_string, label],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((uuid_text, type_string, label, description)) => Ok(Some(GroupRecord {
                uuid: parse_uuid(&uuid_text, "groups.uuid")?,
                type_string,
                label,
                description,
            })),
            None => Ok(None),
        }
    }

    fn insert_group(&self, group: &GroupRecord) -> StoreResult<()> {
        insert_group_row(self.conn, group)
    }

    fn insert_node(&self, node: &PseudoNode) -> StoreResult<()> {
        insert_node_row(self.conn, node)
    }

    fn get_node(&self, id: NodeId) -> StoreResult<Option<PseudoNode>> {
        let mut nodes = self.query_nodes(
            &format!("{NODE_SELECT_SQL} WHERE n.uuid = ?1;"),
            [id.to_string()],
        )?;
        Ok(nodes.pop())
    }

    fn find_node_by_checksum(
        &self,
        node_type: &str,
        checksum: &str,
        element: Option<&str>,
    ) -> StoreResult<Option<PseudoNode>> {
        let mut nodes = self.query_nodes(
            &format!(
                "{NODE_SELECT_SQL}
                 WHERE n.node_type = ?1
                   AND n.checksum = ?2
                   AND n.element IS ?3
                 ORDER BY n.rowid ASC
                 LIMIT 1;"
            ),
            params![node_type, checksum, element],
        )?;
        Ok(nodes.pop())
    }

    fn add_group_records(&self, group: GroupId, nodes: &[PseudoNode]) -> StoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;

        let group_exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM groups WHERE uuid = ?1);",
            [group.to_string()],
            |row| row.get(0),
        )?;
        if !group_exists {
            return Err(StoreError::NotFound(format!("group {group}")));
        }

        attach_records(&tx, group, nodes)?;
        tx.commit()?;
        Ok(())
    }

    fn insert_group_with_records(
        &self,
        group: &GroupRecord,
        nodes: &[PseudoNode],
    ) -> StoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        insert_group_row(&tx, group)?;
        attach_records(&tx, group.uuid, nodes)?;
        tx.commit()?;
        Ok(())
    }

    fn list_group_nodes(&self, group: GroupId) -> StoreResult<Vec<PseudoNode>> {
        self.query_nodes(
            &format!(
                "{NODE_SELECT_SQL}
                 INNER JOIN group_nodes gn ON gn.node_uuid = n.uuid
                 WHERE gn.group_uuid = ?1
                 ORDER BY gn.rowid ASC;"
            ),
            [group.to_string()],
        )
    }

    fn find_group_nodes_by_element(
        &self,
        group: GroupId,
        node_type: &str,
        element: &str,
    ) -> StoreResult<Vec<PseudoNode>> {
        self.query_nodes(
            &format!(
                "{NODE_SELECT_SQL}
                 INNER JOIN group_nodes gn ON gn.node_uuid = n.uuid
                 WHERE gn.group_uuid = ?1
                   AND n.node_type = ?2
                   AND n.element = ?3
                 ORDER BY gn.rowid ASC;"
            ),
            params![group.to_string(), node_type, element],
        )
    }
}

fn insert_group_row(conn: &Connection, group: &GroupRecord) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO groups (uuid, type_string, label, description)
         VALUES (?1, ?2, ?3, ?4);",
        params![
            group.uuid.to_string(),
            group.type_string.as_str(),
            group.label.as_str(),
            group.description.as_str(),
        ],
    )
    .map_err(|err| {
        conflict_or(
            err,
            format!("group `{}` of type `{}`", group.label, group.type_string),
        )
    })?;
    Ok(())
}

fn insert_node_row(conn: &Connection, node: &PseudoNode) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO nodes (uuid, node_type, filename, element, checksum, content)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            node.uuid().to_string(),
            node.node_type(),
            node.filename(),
            node.element(),
            node.checksum(),
            node.content(),
        ],
    )
    .map_err(|err| conflict_or(err, format!("node {}", node.uuid())))?;
    Ok(())
}

/// Inserts the unstored `nodes`, then links every node to `group`.
/// Callers own the surrounding transaction.
fn attach_records(conn: &Connection, group: GroupId, nodes: &[PseudoNode]) -> StoreResult<()> {
    for node in nodes.iter().filter(|node| !node.is_stored()) {
        insert_node_row(conn, node)?;
    }

    let mut stmt =
        conn.prepare("INSERT INTO group_nodes (group_uuid, node_uuid) VALUES (?1, ?2);")?;
    for node in nodes {
        let id = node.uuid();
        stmt.execute(params![group.to_string(), id.to_string()])
            .map_err(|err| match constraint_kind(&err) {
                Some(ConstraintKind::ForeignKey) => StoreError::NotFound(format!("node {id}")),
                Some(ConstraintKind::Unique) => {
                    StoreError::Conflict(format!("node {id} already in group {group}"))
                }
                None => err.into(),
            })?;
    }
    Ok(())
}

fn parse_node_row(row: &Row<'_>) -> StoreResult<PseudoNode> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = parse_uuid(&uuid_text, "nodes.uuid")?;
    let persisted_checksum: String = row.get("checksum")?;

    let node = PseudoNode::restore(
        uuid,
        row.get::<_, String>("node_type")?,
        row.get::<_, String>("filename")?,
        row.get::<_, Option<String>>("element")?,
        row.get::<_, Vec<u8>>("content")?,
    );

    if node.checksum() != persisted_checksum {
        return Err(StoreError::InvalidData(format!(
            "checksum mismatch for node {uuid}: persisted `{persisted_checksum}`, content `{}`",
            node.checksum()
        )));
    }

    Ok(node)
}

fn parse_uuid(value: &str, column: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConstraintKind {
    ForeignKey,
    Unique,
}

fn constraint_kind(err: &rusqlite::Error) -> Option<ConstraintKind> {
    match err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
                Some(ConstraintKind::ForeignKey)
            } else {
                Some(ConstraintKind::Unique)
            }
        }
        _ => None,
    }
}

fn conflict_or(err: rusqlite::Error, what: String) -> StoreError {
    match constraint_kind(&err) {
        Some(_) => StoreError::Conflict(format!("{what} already exists")),
        None => err.into(),
    }
}
