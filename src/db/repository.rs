//! Database repository for CRUD operations.
//!
//! Uses prepared statements and transactions for data integrity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{
    Cause, CreateCauseRequest, CreateDonationRequest, CreateOrderRequest, Donation, NewQuoteRequest,
    Notification, Order, OrderItem, OrderStatus, PaymentMethod, QuoteMode, QuoteRequestRecord,
    QuoteStatus,
};

const DONATION_COLUMNS: &str = "id, donor_name, amount, cause, payment_method, created_at, user_id";

const ORDER_COLUMNS: &str = "id, order_number, user_id, status, payment_method, subtotal, \
     total_donation, total, shipping_name, shipping_line1, shipping_line2, shipping_city, \
     shipping_state, shipping_postal_code, shipping_country, created_at, updated_at";

const QUOTE_REQUEST_COLUMNS: &str = "id, user_id, donation_id, type, mode, status, request_body, \
     response_body, error_message, created_at, updated_at";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== DONATION OPERATIONS ====================

    /// List donations, newest first, optionally filtered by cause and/or user.
    pub async fn list_donations(
        &self,
        cause: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<Vec<Donation>, AppError> {
        let sql = format!(
            "SELECT {DONATION_COLUMNS} FROM donations {} ORDER BY created_at DESC",
            match (cause, user_id) {
                (Some(_), Some(_)) => "WHERE cause = ? AND user_id = ?",
                (Some(_), None) => "WHERE cause = ?",
                (None, Some(_)) => "WHERE user_id = ?",
                (None, None) => "",
            }
        );

        let mut query = sqlx::query(&sql);
        if let Some(cause) = cause {
            query = query.bind(cause);
        }
        if let Some(user_id) = user_id {
            query = query.bind(user_id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(donation_from_row).collect()
    }

    /// Create a new donation. Amount validation happens at the API boundary;
    /// the row stored here is already well-formed.
    pub async fn create_donation(
        &self,
        request: &CreateDonationRequest,
    ) -> Result<Donation, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO donations (id, donor_name, amount, cause, payment_method, created_at, user_id) VALUES (?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(&id)
        .bind(&request.donor_name)
        .bind(request.amount.to_string())
        .bind(&request.cause)
        .bind(request.payment_method.as_str())
        .bind(now.to_rfc3339())
        .bind(&request.user_id)
        .execute(&self.pool)
        .await?;

        Ok(Donation {
            id,
            donor_name: request.donor_name.clone(),
            amount: request.amount,
            cause: request.cause.clone(),
            payment_method: request.payment_method,
            created_at: now,
            user_id: request.user_id.clone(),
        })
    }

    // ==================== CAUSE OPERATIONS ====================

    /// List all causes.
    pub async fn list_causes(&self) -> Result<Vec<Cause>, AppError> {
        let rows = sqlx::query(
            "SELECT id, name, description, tags, website_url, created_by, created_at FROM causes ORDER BY name"
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(cause_from_row).collect()
    }

    /// Get a cause by its unique name.
    pub async fn get_cause_by_name(&self, name: &str) -> Result<Option<Cause>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, description, tags, website_url, created_by, created_at FROM causes WHERE name = ?"
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(cause_from_row).transpose()
    }

    /// Create a new cause.
    pub async fn create_cause(&self, request: &CreateCauseRequest) -> Result<Cause, AppError> {
        if self.get_cause_by_name(&request.name).await?.is_some() {
            return Err(AppError::validation(format!(
                "Cause '{}' already exists",
                request.name
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let tags_json = request
            .tags
            .as_ref()
            .map(|t| serde_json::to_string(t).unwrap_or_default());

        sqlx::query(
            "INSERT INTO causes (id, name, description, tags, website_url, created_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(&id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(&tags_json)
        .bind(&request.website_url)
        .bind(&request.created_by)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Cause {
            id,
            name: request.name.clone(),
            description: request.description.clone(),
            tags: request.tags.clone(),
            website_url: request.website_url.clone(),
            created_by: request.created_by.clone(),
            created_at: now,
        })
    }

    // ==================== ORDER OPERATIONS ====================

    /// Create an order with its items in a single transaction.
    ///
    /// When the items carry a donation amount, a donation row attributed to
    /// the order's cause is written in the same transaction; either the whole
    /// checkout is durable or none of it is.
    pub async fn create_order(
        &self,
        request: &CreateOrderRequest,
    ) -> Result<(Order, Option<Donation>), AppError> {
        let order_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let order_number = generate_order_number(now);

        let mut subtotal = Decimal::ZERO;
        let mut total_donation = Decimal::ZERO;
        for item in &request.items {
            subtotal += item.price * Decimal::from(item.quantity);
            total_donation += item.donation_amount;
        }
        let total = subtotal + total_donation;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO orders (
                id, order_number, user_id, status, payment_method,
                subtotal, total_donation, total,
                shipping_name, shipping_line1, shipping_line2, shipping_city,
                shipping_state, shipping_postal_code, shipping_country,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&order_id)
        .bind(&order_number)
        .bind(&request.user_id)
        .bind(OrderStatus::Pending.as_str())
        .bind(request.payment_method.as_str())
        .bind(subtotal.to_string())
        .bind(total_donation.to_string())
        .bind(total.to_string())
        .bind(&request.shipping.name)
        .bind(&request.shipping.line1)
        .bind(&request.shipping.line2)
        .bind(&request.shipping.city)
        .bind(&request.shipping.state)
        .bind(&request.shipping.postal_code)
        .bind(&request.shipping.country)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let item_id = uuid::Uuid::new_v4().to_string();
            sqlx::query(
                r#"INSERT INTO order_items (
                    id, order_id, product_id, product_name, product_image,
                    size, quantity, price, donation_amount, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&item_id)
            .bind(&order_id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(&item.product_image)
            .bind(&item.size)
            .bind(item.quantity)
            .bind(item.price.to_string())
            .bind(item.donation_amount.to_string())
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await?;

            items.push(OrderItem {
                id: item_id,
                order_id: order_id.clone(),
                product_id: item.product_id,
                product_name: item.product_name.clone(),
                product_image: item.product_image.clone(),
                size: item.size.clone(),
                quantity: item.quantity,
                price: item.price,
                donation_amount: item.donation_amount,
                created_at: now,
            });
        }

        // Record the order's donation so it shows up in dashboards and feeds.
        let donation = if total_donation > Decimal::ZERO {
            let donation_id = uuid::Uuid::new_v4().to_string();
            let cause = request
                .donation_cause
                .clone()
                .unwrap_or_else(|| "community".to_string());

            sqlx::query(
                "INSERT INTO donations (id, donor_name, amount, cause, payment_method, created_at, user_id) VALUES (?, ?, ?, ?, ?, ?, ?)"
            )
            .bind(&donation_id)
            .bind(&request.shipping.name)
            .bind(total_donation.to_string())
            .bind(&cause)
            .bind(request.payment_method.as_str())
            .bind(now.to_rfc3339())
            .bind(&request.user_id)
            .execute(&mut *tx)
            .await?;

            Some(Donation {
                id: donation_id,
                donor_name: request.shipping.name.clone(),
                amount: total_donation,
                cause,
                payment_method: request.payment_method,
                created_at: now,
                user_id: Some(request.user_id.clone()),
            })
        } else {
            None
        };

        tx.commit().await?;

        let order = Order {
            id: order_id,
            order_number,
            user_id: request.user_id.clone(),
            status: OrderStatus::Pending,
            payment_method: request.payment_method,
            subtotal,
            total_donation,
            total,
            shipping_name: request.shipping.name.clone(),
            shipping_line1: request.shipping.line1.clone(),
            shipping_line2: request.shipping.line2.clone(),
            shipping_city: request.shipping.city.clone(),
            shipping_state: request.shipping.state.clone(),
            shipping_postal_code: request.shipping.postal_code.clone(),
            shipping_country: request.shipping.country.clone(),
            created_at: now,
            updated_at: now,
            items,
        };

        Ok((order, donation))
    }

    /// Get an order with its items.
    pub async fn get_order(&self, id: &str) -> Result<Option<Order>, AppError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut order = order_from_row(&row)?;
        order.items = self.list_order_items(&order.id).await?;
        Ok(Some(order))
    }

    /// List orders with items, newest first, optionally filtered by user.
    pub async fn list_orders(&self, user_id: Option<&str>) -> Result<Vec<Order>, AppError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders {} ORDER BY created_at DESC",
            if user_id.is_some() {
                "WHERE user_id = ?"
            } else {
                ""
            }
        );

        let mut query = sqlx::query(&sql);
        if let Some(user_id) = user_id {
            query = query.bind(user_id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut order = order_from_row(row)?;
            order.items = self.list_order_items(&order.id).await?;
            orders.push(order);
        }
        Ok(orders)
    }

    async fn list_order_items(&self, order_id: &str) -> Result<Vec<OrderItem>, AppError> {
        let rows = sqlx::query(
            "SELECT id, order_id, product_id, product_name, product_image, size, quantity, price, donation_amount, created_at FROM order_items WHERE order_id = ? ORDER BY created_at"
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(order_item_from_row).collect()
    }

    // ==================== QUOTE AUDIT OPERATIONS ====================

    /// Append one row to the quote audit log.
    pub async fn record_quote_request(
        &self,
        request: &NewQuoteRequest,
    ) -> Result<QuoteRequestRecord, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"INSERT INTO quote_requests (
                id, user_id, donation_id, type, mode, status,
                request_body, response_body, error_message, created_at, updated_at
            ) VALUES (?, ?, ?, 'quote', ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(&request.user_id)
        .bind(&request.donation_id)
        .bind(request.mode.as_str())
        .bind(request.status.as_str())
        .bind(request.request_body.to_string())
        .bind(request.response_body.as_ref().map(|b| b.to_string()))
        .bind(&request.error_message)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(QuoteRequestRecord {
            id,
            user_id: request.user_id.clone(),
            donation_id: request.donation_id.clone(),
            request_type: "quote".to_string(),
            mode: request.mode,
            status: request.status,
            request_body: request.request_body.clone(),
            response_body: request.response_body.clone(),
            error_message: request.error_message.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    /// List recent quote audit rows, newest first.
    pub async fn list_quote_requests(
        &self,
        limit: i64,
    ) -> Result<Vec<QuoteRequestRecord>, AppError> {
        let sql = format!(
            "SELECT {QUOTE_REQUEST_COLUMNS} FROM quote_requests ORDER BY created_at DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?;
        rows.iter().map(quote_request_from_row).collect()
    }

    // ==================== NOTIFICATION OPERATIONS ====================

    /// Create a notification for a user.
    pub async fn create_notification(
        &self,
        user_id: &str,
        kind: &str,
        title: &str,
        body: &str,
    ) -> Result<Notification, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO notifications (id, user_id, type, title, body, read_at, created_at) VALUES (?, ?, ?, ?, ?, NULL, ?)"
        )
        .bind(&id)
        .bind(user_id)
        .bind(kind)
        .bind(title)
        .bind(body)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Notification {
            id,
            user_id: user_id.to_string(),
            kind: kind.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            read_at: None,
            created_at: now,
        })
    }

    /// List a user's notifications, unread first, newest first within each group.
    pub async fn list_notifications(&self, user_id: &str) -> Result<Vec<Notification>, AppError> {
        let rows = sqlx::query(
            "SELECT id, user_id, type, title, body, read_at, created_at FROM notifications WHERE user_id = ? ORDER BY (read_at IS NULL) DESC, created_at DESC"
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(notification_from_row).collect()
    }

    /// Mark a notification as read. Idempotent for already-read notifications.
    pub async fn mark_notification_read(&self, id: &str) -> Result<Notification, AppError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE notifications SET read_at = COALESCE(read_at, ?) WHERE id = ?",
        )
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Notification {} not found", id)));
        }

        let row = sqlx::query(
            "SELECT id, user_id, type, title, body, read_at, created_at FROM notifications WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        notification_from_row(&row)
    }
}

/// Generate a human-readable order number.
fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "ORD-{}-{}",
        now.timestamp_millis(),
        suffix[..9].to_uppercase()
    )
}

fn parse_amount(raw: &str) -> Result<Decimal, AppError> {
    raw.parse::<Decimal>()
        .map_err(|e| AppError::Database(format!("Malformed amount {:?}: {}", raw, e)))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Database(format!("Malformed timestamp {:?}: {}", raw, e)))
}

fn donation_from_row(row: &SqliteRow) -> Result<Donation, AppError> {
    let amount: String = row.get("amount");
    let payment_method: String = row.get("payment_method");
    let created_at: String = row.get("created_at");

    Ok(Donation {
        id: row.get("id"),
        donor_name: row.get("donor_name"),
        amount: parse_amount(&amount)?,
        cause: row.get("cause"),
        payment_method: PaymentMethod::from_str(&payment_method).ok_or_else(|| {
            AppError::Database(format!("Unknown payment method: {}", payment_method))
        })?,
        created_at: parse_timestamp(&created_at)?,
        user_id: row.get("user_id"),
    })
}

fn cause_from_row(row: &SqliteRow) -> Result<Cause, AppError> {
    let tags: Option<String> = row.get("tags");
    let created_at: String = row.get("created_at");

    Ok(Cause {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        tags: tags
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| AppError::Database(format!("Malformed cause tags: {}", e)))?,
        website_url: row.get("website_url"),
        created_by: row.get("created_by"),
        created_at: parse_timestamp(&created_at)?,
    })
}

fn order_from_row(row: &SqliteRow) -> Result<Order, AppError> {
    let status: String = row.get("status");
    let payment_method: String = row.get("payment_method");
    let subtotal: String = row.get("subtotal");
    let total_donation: String = row.get("total_donation");
    let total: String = row.get("total");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Order {
        id: row.get("id"),
        order_number: row.get("order_number"),
        user_id: row.get("user_id"),
        status: OrderStatus::from_str(&status)
            .ok_or_else(|| AppError::Database(format!("Unknown order status: {}", status)))?,
        payment_method: PaymentMethod::from_str(&payment_method).ok_or_else(|| {
            AppError::Database(format!("Unknown payment method: {}", payment_method))
        })?,
        subtotal: parse_amount(&subtotal)?,
        total_donation: parse_amount(&total_donation)?,
        total: parse_amount(&total)?,
        shipping_name: row.get("shipping_name"),
        shipping_line1: row.get("shipping_line1"),
        shipping_line2: row.get("shipping_line2"),
        shipping_city: row.get("shipping_city"),
        shipping_state: row.get("shipping_state"),
        shipping_postal_code: row.get("shipping_postal_code"),
        shipping_country: row.get("shipping_country"),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        items: Vec::new(),
    })
}

fn order_item_from_row(row: &SqliteRow) -> Result<OrderItem, AppError> {
    let price: String = row.get("price");
    let donation_amount: String = row.get("donation_amount");
    let created_at: String = row.get("created_at");

    Ok(OrderItem {
        id: row.get("id"),
        order_id: row.get("order_id"),
        product_id: row.get("product_id"),
        product_name: row.get("product_name"),
        product_image: row.get("product_image"),
        size: row.get("size"),
        quantity: row.get("quantity"),
        price: parse_amount(&price)?,
        donation_amount: parse_amount(&donation_amount)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn notification_from_row(row: &SqliteRow) -> Result<Notification, AppError> {
    let read_at: Option<String> = row.get("read_at");
    let created_at: String = row.get("created_at");

    Ok(Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        kind: row.get("type"),
        title: row.get("title"),
        body: row.get("body"),
        read_at: read_at.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn quote_request_from_row(row: &SqliteRow) -> Result<QuoteRequestRecord, AppError> {
    let mode: String = row.get("mode");
    let status: String = row.get("status");
    let request_body: String = row.get("request_body");
    let response_body: Option<String> = row.get("response_body");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(QuoteRequestRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        donation_id: row.get("donation_id"),
        request_type: row.get("type"),
        mode: QuoteMode::from_str(&mode)
            .ok_or_else(|| AppError::Database(format!("Unknown quote mode: {}", mode)))?,
        status: QuoteStatus::from_str(&status)
            .ok_or_else(|| AppError::Database(format!("Unknown quote status: {}", status)))?,
        request_body: serde_json::from_str(&request_body)
            .map_err(|e| AppError::Database(format!("Malformed quote request body: {}", e)))?,
        response_body: response_body
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| AppError::Database(format!("Malformed quote response body: {}", e)))?,
        error_message: row.get("error_message"),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
