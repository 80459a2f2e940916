//! In-memory store implementations.
//!
//! Each store guards a map with a `tokio::sync::Mutex`, so every method is
//! atomic with respect to the others, matching the guarantees the
//! `PostgreSQL` implementations get from single statements.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use smart_print_core::{Email, OrderId, OtpCode, OtpPurpose, OtpRecordId, UserId};

use super::users::hash_for_storage;
use super::{CredentialStore, OrderStore, OtpLedger, RepositoryError};
use crate::models::order::{
    DEFAULT_ORDER_STATUS, NewOrder, Order, PaymentResult, StatusUpdate, Tracking,
};
use crate::models::otp::{NewOtp, OtpRecord};
use crate::models::user::{NewUser, User, UserChanges, UserPage, UserQuery};

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Default)]
struct UserTable {
    next_id: i32,
    rows: BTreeMap<i32, User>,
}

/// In-memory [`CredentialStore`].
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    inner: Mutex<UserTable>,
}

impl MemoryUserStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn email_taken(table: &UserTable, email: &Email, except: Option<i32>) -> bool {
    table
        .rows
        .values()
        .any(|u| &u.email == email && Some(u.id.as_i32()) != except)
}

#[async_trait]
impl CredentialStore for MemoryUserStore {
    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let table = self.inner.lock().await;
        Ok(table.rows.values().find(|u| &u.email == email).cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let table = self.inner.lock().await;
        Ok(table.rows.get(&id.as_i32()).cloned())
    }

    async fn create(&self, new_user: NewUser) -> Result<User, RepositoryError> {
        let password_hash = hash_for_storage(&new_user.password)?;
        let mut table = self.inner.lock().await;

        if email_taken(&table, &new_user.email, None) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        table.next_id += 1;
        let id = table.next_id;
        let now = Utc::now();
        let user = User {
            id: UserId::new(id),
            name: User::display_name(&new_user.first_name, &new_user.last_name),
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            email: new_user.email,
            password_hash,
            is_admin: new_user.is_admin,
            is_blocked: false,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(id, user.clone());
        Ok(user)
    }

    async fn save(&self, id: UserId, changes: UserChanges) -> Result<User, RepositoryError> {
        let password_hash = changes
            .password
            .as_ref()
            .map(hash_for_storage)
            .transpose()?;
        let mut table = self.inner.lock().await;

        if let Some(email) = &changes.email
            && email_taken(&table, email, Some(id.as_i32()))
        {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let user = table
            .rows
            .get_mut(&id.as_i32())
            .ok_or(RepositoryError::NotFound)?;

        if let Some(first) = changes.first_name {
            user.first_name = first;
        }
        if let Some(last) = changes.last_name {
            user.last_name = last;
        }
        user.name = User::display_name(&user.first_name, &user.last_name);
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(hash) = password_hash {
            user.password_hash = hash;
        }
        user.updated_at = Utc::now();

        Ok(user.clone())
    }

    async fn list(&self, query: &UserQuery) -> Result<UserPage, RepositoryError> {
        let table = self.inner.lock().await;
        let needle = query.search.as_deref().map(str::to_lowercase);

        let mut matched: Vec<&User> = table
            .rows
            .values()
            .filter(|u| {
                needle.as_deref().is_none_or(|n| {
                    [
                        u.name.as_str(),
                        u.email.as_str(),
                        u.first_name.as_str(),
                        u.last_name.as_str(),
                    ]
                        .iter()
                        .any(|field| field.to_lowercase().contains(n))
                })
            })
            .collect();
        matched.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.as_i32().cmp(&a.id.as_i32()))
        });

        let total = matched.len() as u64;
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let users = matched
            .into_iter()
            .skip(offset)
            .take(query.limit as usize)
            .cloned()
            .collect();

        Ok(UserPage::new(users, query, total))
    }

    async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        let mut table = self.inner.lock().await;
        table
            .rows
            .remove(&id.as_i32())
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn set_blocked(&self, id: UserId, blocked: bool) -> Result<User, RepositoryError> {
        let mut table = self.inner.lock().await;
        let user = table
            .rows
            .get_mut(&id.as_i32())
            .ok_or(RepositoryError::NotFound)?;
        user.is_blocked = blocked;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

// =============================================================================
// OTP ledger
// =============================================================================

#[derive(Debug, Default)]
struct OtpTable {
    next_id: i32,
    rows: HashMap<(Email, OtpPurpose), OtpRecord>,
}

/// In-memory [`OtpLedger`].
#[derive(Debug, Default)]
pub struct MemoryOtpLedger {
    inner: Mutex<OtpTable>,
}

impl MemoryOtpLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held, live or not.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.rows.len()
    }

    /// Returns true if the ledger holds no records.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl OtpLedger for MemoryOtpLedger {
    async fn upsert(&self, otp: NewOtp) -> Result<OtpRecord, RepositoryError> {
        let mut table = self.inner.lock().await;
        let key = (otp.email.clone(), otp.purpose);

        // An upsert keeps the row id, like `ON CONFLICT DO UPDATE`.
        let id = if let Some(existing) = table.rows.get(&key) {
            existing.id
        } else {
            table.next_id += 1;
            OtpRecordId::new(table.next_id)
        };

        let record = OtpRecord {
            id,
            email: otp.email,
            purpose: otp.purpose,
            code: otp.code,
            payload: otp.payload,
            created_at: otp.created_at,
            expires_at: otp.expires_at,
        };
        table.rows.insert(key, record.clone());
        Ok(record)
    }

    async fn find_live(
        &self,
        email: &Email,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, RepositoryError> {
        let mut table = self.inner.lock().await;
        let key = (email.clone(), purpose);

        match table.rows.get(&key) {
            Some(record) if record.is_live(now) => Ok(Some(record.clone())),
            Some(_) => {
                table.rows.remove(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn consume(
        &self,
        email: &Email,
        purpose: OtpPurpose,
        code: &OtpCode,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, RepositoryError> {
        let mut table = self.inner.lock().await;
        let key = (email.clone(), purpose);

        let Some(record) = table.rows.get(&key) else {
            return Ok(None);
        };

        if !record.is_live(now) {
            table.rows.remove(&key);
            return Ok(None);
        }

        if !record.code.matches(code) {
            return Ok(None);
        }

        Ok(table.rows.remove(&key))
    }

    async fn delete_if_present(&self, id: OtpRecordId) -> Result<bool, RepositoryError> {
        let mut table = self.inner.lock().await;
        let before = table.rows.len();
        table.rows.retain(|_, r| r.id != id);
        Ok(table.rows.len() < before)
    }

    async fn delete_all_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut table = self.inner.lock().await;
        let before = table.rows.len();
        table.rows.retain(|_, r| r.is_live(now));
        Ok((before - table.rows.len()) as u64)
    }
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Default)]
struct OrderTable {
    next_id: i32,
    rows: BTreeMap<i32, Order>,
}

/// In-memory [`OrderStore`].
#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    inner: Mutex<OrderTable>,
    /// Number of `save_payment` calls, for asserting that rejected
    /// payments never reach the store.
    writes: std::sync::atomic::AtomicUsize,
}

impl MemoryOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `save_payment` has been called.
    #[must_use]
    pub fn payment_writes(&self) -> usize {
        self.writes.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut table = self.inner.lock().await;
        table.next_id += 1;
        let id = table.next_id;

        let order = Order {
            id: OrderId::new(id),
            user_id: order.user_id,
            items: order.items,
            shipping_address: order.shipping_address,
            payment_method: order.payment_method,
            items_price: order.items_price,
            tax_price: order.tax_price,
            shipping_price: order.shipping_price,
            total_price: order.total_price,
            is_paid: false,
            paid_at: None,
            payment_result: None,
            status: DEFAULT_ORDER_STATUS.to_owned(),
            tracking: Tracking::default(),
            is_delivered: false,
            delivered_at: None,
            created_at: Utc::now(),
        };
        table.rows.insert(id, order.clone());
        Ok(order)
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let table = self.inner.lock().await;
        Ok(table.rows.get(&id.as_i32()).cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let table = self.inner.lock().await;
        Ok(table
            .rows
            .values()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Order>, RepositoryError> {
        let table = self.inner.lock().await;
        Ok(table.rows.values().rev().cloned().collect())
    }

    async fn update_status(
        &self,
        id: OrderId,
        update: StatusUpdate,
        now: DateTime<Utc>,
    ) -> Result<Order, RepositoryError> {
        let mut table = self.inner.lock().await;
        let order = table
            .rows
            .get_mut(&id.as_i32())
            .ok_or(RepositoryError::NotFound)?;
        order.apply_status(update, now);
        Ok(order.clone())
    }

    async fn save_payment(
        &self,
        id: OrderId,
        result: PaymentResult,
    ) -> Result<Order, RepositoryError> {
        self.writes
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut table = self.inner.lock().await;
        let order = table
            .rows
            .get_mut(&id.as_i32())
            .ok_or(RepositoryError::NotFound)?;
        order.mark_paid(result);
        Ok(order.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use secrecy::SecretString;

    use super::*;

    fn email(s: &str) -> Email {
        Email::parse(s).unwrap()
    }

    fn new_otp(code: u32, created: DateTime<Utc>) -> NewOtp {
        NewOtp {
            email: email("a@b.co"),
            purpose: OtpPurpose::PasswordReset,
            code: OtpCode::from_number(code),
            payload: None,
            created_at: created,
            expires_at: created + Duration::minutes(10),
        }
    }

    fn new_user(addr: &str) -> NewUser {
        NewUser {
            first_name: "Ada".to_owned(),
            last_name: "Lovelace".to_owned(),
            email: email(addr),
            password: SecretString::from("analytical-engine"),
            is_admin: false,
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_record() {
        let ledger = MemoryOtpLedger::new();
        let now = Utc::now();
        let first = ledger.upsert(new_otp(111_111, now)).await.unwrap();
        let second = ledger.upsert(new_otp(222_222, now)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(ledger.len().await, 1);
        let live = ledger
            .find_live(&email("a@b.co"), OtpPurpose::PasswordReset, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(live.code.as_str(), "222222");
    }

    #[tokio::test]
    async fn test_purposes_are_independent_keys() {
        let ledger = MemoryOtpLedger::new();
        let now = Utc::now();
        ledger.upsert(new_otp(1, now)).await.unwrap();
        let mut registration = new_otp(2, now);
        registration.purpose = OtpPurpose::Registration;
        ledger.upsert(registration).await.unwrap();

        assert_eq!(ledger.len().await, 2);
    }

    #[tokio::test]
    async fn test_consume_wrong_code_keeps_record() {
        let ledger = MemoryOtpLedger::new();
        let now = Utc::now();
        ledger.upsert(new_otp(123_456, now)).await.unwrap();

        let wrong = ledger
            .consume(
                &email("a@b.co"),
                OtpPurpose::PasswordReset,
                &OtpCode::from_number(654_321),
                now,
            )
            .await
            .unwrap();
        assert!(wrong.is_none());
        assert_eq!(ledger.len().await, 1);

        let right = ledger
            .consume(
                &email("a@b.co"),
                OtpPurpose::PasswordReset,
                &OtpCode::from_number(123_456),
                now,
            )
            .await
            .unwrap();
        assert!(right.is_some());
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_consume_expired_evicts() {
        let ledger = MemoryOtpLedger::new();
        let created = Utc::now();
        ledger.upsert(new_otp(123_456, created)).await.unwrap();

        let later = created + Duration::minutes(11);
        let result = ledger
            .consume(
                &email("a@b.co"),
                OtpPurpose::PasswordReset,
                &OtpCode::from_number(123_456),
                later,
            )
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_all_expired_and_absent_deletes() {
        let ledger = MemoryOtpLedger::new();
        let created = Utc::now();
        let record = ledger.upsert(new_otp(1, created)).await.unwrap();

        assert_eq!(ledger.delete_all_expired(created).await.unwrap(), 0);
        let later = created + Duration::minutes(10);
        assert_eq!(ledger.delete_all_expired(later).await.unwrap(), 1);
        assert_eq!(ledger.delete_all_expired(later).await.unwrap(), 0);
        assert!(!ledger.delete_if_present(record.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_user_create_hashes_and_rejects_duplicates() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("ada@example.com")).await.unwrap();

        assert_eq!(user.name, "Ada Lovelace");
        assert!(user.password_hash.starts_with("$argon2"));
        assert!(matches!(
            store.create(new_user("ada@example.com")).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_user_save_rehashes_only_on_password_change() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("ada@example.com")).await.unwrap();

        let renamed = store
            .save(
                user.id,
                UserChanges {
                    first_name: Some("Augusta".to_owned()),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Augusta Lovelace");
        assert_eq!(renamed.password_hash, user.password_hash);

        let repassworded = store
            .save(user.id, UserChanges::password(SecretString::from("difference-engine")))
            .await
            .unwrap();
        assert_ne!(repassworded.password_hash, user.password_hash);
    }

    #[tokio::test]
    async fn test_user_list_search_and_paging() {
        let store = MemoryUserStore::new();
        store.create(new_user("ada@example.com")).await.unwrap();
        let mut grace = new_user("grace@example.com");
        grace.first_name = "Grace".to_owned();
        grace.last_name = "Hopper".to_owned();
        store.create(grace).await.unwrap();

        let page = store
            .list(&UserQuery::new(None, None, Some("HOP".to_owned())))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.users[0].name, "Grace Hopper");

        let page = store
            .list(&UserQuery::new(Some(2), Some(1), None))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.pages, 2);
        assert_eq!(page.users.len(), 1);
        assert_eq!(page.users[0].email.as_str(), "ada@example.com");
    }

    #[tokio::test]
    async fn test_save_payment_missing_order() {
        let store = MemoryOrderStore::new();
        let result = store
            .save_payment(
                OrderId::new(99),
                PaymentResult::paid("pay_1", "a@b.co", Utc::now()),
            )
            .await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_update_status_and_list_all() {
        let store = MemoryOrderStore::new();
        for user in [1, 2] {
            store
                .create(NewOrder {
                    user_id: UserId::new(user),
                    items: vec![],
                    shipping_address: crate::models::order::ShippingAddress::default(),
                    payment_method: "Razorpay".to_owned(),
                    items_price: rust_decimal::Decimal::ZERO,
                    tax_price: rust_decimal::Decimal::ZERO,
                    shipping_price: rust_decimal::Decimal::ZERO,
                    total_price: rust_decimal::Decimal::ZERO,
                })
                .await
                .unwrap();
        }

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].user_id, UserId::new(2));

        let now = Utc::now();
        let delivered = store
            .update_status(
                all[1].id,
                StatusUpdate::new(Some("Delivered".to_owned()), None, None),
                now,
            )
            .await
            .unwrap();
        assert!(delivered.is_delivered);
        assert_eq!(delivered.delivered_at, Some(now));

        let missing = store
            .update_status(OrderId::new(99), StatusUpdate::default(), now)
            .await;
        assert!(matches!(missing, Err(RepositoryError::NotFound)));
    }
}
