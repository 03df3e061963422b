use crate::adapters::database::records::ConversationRecord;
use crate::adapters::database::records::conversation::CONVERSATION_COLUMNS;
use crate::domain::conversation::{Conversation, ConversationFilter, ConversationStatus};
use crate::domain::page::{Page, PageRequest};
use crate::domain::party::{Party, PartyKind};
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct ConversationRepository {}

impl ConversationRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Inserts a conversation, yielding `None` when the order triple already exists.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the insert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, conversation), fields(conversation_id = %conversation.id))]
    pub(crate) async fn insert(
        &self,
        conn: &mut PgConnection,
        conversation: &Conversation,
    ) -> Result<Option<Conversation>> {
        let sql = format!(
            r#"
            INSERT INTO conversations (id, order_id, requester_id, server_id, title, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            ON CONFLICT (requester_id, server_id, order_id) WHERE order_id IS NOT NULL DO NOTHING
            RETURNING {CONVERSATION_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, ConversationRecord>(&sql)
            .bind(conversation.id)
            .bind(conversation.order_id)
            .bind(conversation.requester_id)
            .bind(conversation.server_id)
            .bind(&conversation.title)
            .bind(conversation.status.as_str())
            .bind(conversation.created_at)
            .fetch_optional(conn)
            .await?;
        record.map(Conversation::try_from).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find(&self, conn: &mut PgConnection, id: Uuid) -> Result<Option<Conversation>> {
        let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1");
        let record = sqlx::query_as::<_, ConversationRecord>(&sql).bind(id).fetch_optional(conn).await?;
        record.map(Conversation::try_from).transpose()
    }

    /// Locks the conversation row for the rest of the transaction.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the conversation does not exist.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn lock(&self, conn: &mut PgConnection, id: Uuid) -> Result<Conversation> {
        let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1 FOR UPDATE");
        let record = sqlx::query_as::<_, ConversationRecord>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?
            .ok_or(AppError::NotFound("Conversation"))?;
        Conversation::try_from(record)
    }

    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find_by_order(
        &self,
        conn: &mut PgConnection,
        requester_id: i64,
        server_id: i64,
        order_id: i64,
    ) -> Result<Option<Conversation>> {
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations \
             WHERE requester_id = $1 AND server_id = $2 AND order_id = $3"
        );
        let record = sqlx::query_as::<_, ConversationRecord>(&sql)
            .bind(requester_id)
            .bind(server_id)
            .bind(order_id)
            .fetch_optional(conn)
            .await?;
        record.map(Conversation::try_from).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn update_status(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        status: ConversationStatus,
        at: OffsetDateTime,
    ) -> Result<Conversation> {
        let sql = format!(
            r#"
            UPDATE conversations
            SET status = $2,
                updated_at = $3,
                archived_at = CASE WHEN $2 = 'ARCHIVED' THEN $3 ELSE archived_at END
            WHERE id = $1
            RETURNING {CONVERSATION_COLUMNS}
            "#
        );
        self.update_returning(sqlx::query_as(&sql).bind(id).bind(status.as_str()).bind(at), conn).await
    }

    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn set_agent(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        agent_id: Option<i64>,
        at: OffsetDateTime,
    ) -> Result<Conversation> {
        let sql = format!(
            "UPDATE conversations SET agent_id = $2, updated_at = $3 WHERE id = $1 RETURNING {CONVERSATION_COLUMNS}"
        );
        self.update_returning(sqlx::query_as(&sql).bind(id).bind(agent_id).bind(at), conn).await
    }

    /// Adds deltas to both counters, never dropping below zero.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn adjust_unread(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        requester_delta: i64,
        server_delta: i64,
    ) -> Result<Conversation> {
        let sql = format!(
            r#"
            UPDATE conversations
            SET requester_unread = GREATEST(requester_unread + $2, 0),
                server_unread = GREATEST(server_unread + $3, 0)
            WHERE id = $1
            RETURNING {CONVERSATION_COLUMNS}
            "#
        );
        self.update_returning(sqlx::query_as(&sql).bind(id).bind(requester_delta).bind(server_delta), conn).await
    }

    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn reset_unread(&self, conn: &mut PgConnection, id: Uuid, side: PartyKind) -> Result<Conversation> {
        let column = match side {
            PartyKind::Requester => "requester_unread",
            PartyKind::Server => "server_unread",
        };
        let sql = format!("UPDATE conversations SET {column} = 0 WHERE id = $1 RETURNING {CONVERSATION_COLUMNS}");
        self.update_returning(sqlx::query_as(&sql).bind(id), conn).await
    }

    #[tracing::instrument(level = "debug", skip(self, conn, preview))]
    pub(crate) async fn set_last_message(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        preview: &str,
        at: OffsetDateTime,
    ) -> Result<Conversation> {
        let sql = format!(
            r#"
            UPDATE conversations
            SET last_message_preview = $2, last_message_at = $3, updated_at = $3
            WHERE id = $1
            RETURNING {CONVERSATION_COLUMNS}
            "#
        );
        self.update_returning(sqlx::query_as(&sql).bind(id).bind(preview).bind(at), conn).await
    }

    /// Lists a party's conversations, most recently updated first.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn list_for_party(
        &self,
        conn: &mut PgConnection,
        party: Party,
        filter: &ConversationFilter,
        page: PageRequest,
    ) -> Result<Page<Conversation>> {
        let (participant, unread_column) = match party.kind {
            PartyKind::Requester => ("requester_id = $1", "requester_unread"),
            PartyKind::Server => ("(server_id = $1 OR agent_id = $1)", "server_unread"),
        };
        let narrowing = |param: u8| match filter {
            ConversationFilter::All => String::new(),
            ConversationFilter::Unread => format!("AND {unread_column} > 0"),
            ConversationFilter::Status(_) => format!("AND status = ${param}"),
            ConversationFilter::Search(_) => format!(
                "AND (title ILIKE '%' || ${param} || '%' OR last_message_preview ILIKE '%' || ${param} || '%')"
            ),
        };
        let argument = match filter {
            ConversationFilter::Status(status) => Some(status.as_str().to_string()),
            ConversationFilter::Search(query) => Some(escape_like(query)),
            ConversationFilter::All | ConversationFilter::Unread => None,
        };

        // Counted separately so pages past the end still report the real total.
        let count_sql = format!("SELECT COUNT(*) FROM conversations WHERE {participant} {}", narrowing(2));
        let mut count = sqlx::query_scalar::<_, i64>(&count_sql).bind(party.id);
        if let Some(argument) = &argument {
            count = count.bind(argument.clone());
        }
        let total = count.fetch_one(&mut *conn).await?;

        let sql = format!(
            r#"
            SELECT {CONVERSATION_COLUMNS}
            FROM conversations
            WHERE {participant} {}
            ORDER BY updated_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
            narrowing(4)
        );
        let mut query = sqlx::query_as::<_, ConversationRecord>(&sql)
            .bind(party.id)
            .bind(i64::from(page.size))
            .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
        if let Some(argument) = argument {
            query = query.bind(argument);
        }
        let records = query.fetch_all(&mut *conn).await?;

        let items = records.into_iter().map(Conversation::try_from).collect::<Result<Vec<_>>>()?;
        Ok(Page::new(items, page, u64::try_from(total).unwrap_or(0)))
    }

    async fn update_returning<'q>(
        &self,
        query: sqlx::query::QueryAs<'q, sqlx::Postgres, ConversationRecord, sqlx::postgres::PgArguments>,
        conn: &mut PgConnection,
    ) -> Result<Conversation> {
        let record = query.fetch_optional(conn).await?.ok_or(AppError::NotFound("Conversation"))?;
        Conversation::try_from(record)
    }
}

/// Escapes LIKE wildcards so user input matches literally.
pub(crate) fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
