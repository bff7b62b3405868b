//! Cart, course purchases and enrollment records.
//!
//! Purchases are paid through [`WalletSessionStore::transact`] to the provider
//! address from the session config. Cart and enrollment records live in the
//! same storage as the session.

use ca_storage::{SessionStorage, keys, load_json, load_list, save_json};
use ca_types::{Amount, CartItem, Enrollment, Transaction, WalletSession};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Result, WalletError};
use crate::store::WalletSessionStore;

pub const MAX_PROGRESS: u8 = 100;

#[derive(Debug, Clone)]
pub struct CheckoutReceipt {
    pub transaction: Transaction,
    pub enrollments: Vec<Enrollment>,
}

pub struct Checkout {
    store: Arc<WalletSessionStore>,
    storage: Arc<dyn SessionStorage>,
    // Serializes cart and enrollment read-modify-write cycles.
    records: Mutex<()>,
}

impl Checkout {
    pub fn new(store: Arc<WalletSessionStore>) -> Self {
        let storage = store.storage();
        Self {
            store,
            storage,
            records: Mutex::new(()),
        }
    }

    pub async fn cart(&self) -> Result<Vec<CartItem>> {
        Ok(load_list(self.storage.as_ref(), keys::CART).await?)
    }

    pub async fn cart_total(&self) -> Result<Amount> {
        Ok(total(&self.cart().await?))
    }

    /// Adds a course unless one with the same id is already in the cart.
    pub async fn add_to_cart(&self, item: CartItem) -> Result<Vec<CartItem>> {
        let _records = self.records.lock().await;
        let mut cart = self.cart().await?;
        if cart.iter().all(|existing| existing.course_id != item.course_id) {
            cart.push(item);
            save_json(self.storage.as_ref(), keys::CART, &cart).await?;
        }
        Ok(cart)
    }

    pub async fn remove_from_cart(&self, course_id: u64) -> Result<Vec<CartItem>> {
        let _records = self.records.lock().await;
        let mut cart = self.cart().await?;
        cart.retain(|item| item.course_id != course_id);
        save_json(self.storage.as_ref(), keys::CART, &cart).await?;
        Ok(cart)
    }

    pub async fn clear_cart(&self) -> Result<()> {
        let _records = self.records.lock().await;
        self.storage.remove(keys::CART).await?;
        Ok(())
    }

    /// Pays for the whole cart in one transaction and enrolls in every course.
    pub async fn checkout(&self) -> Result<CheckoutReceipt> {
        let _records = self.records.lock().await;
        let cart = self.cart().await?;
        if cart.is_empty() {
            return Err(WalletError::EmptyCart);
        }
        let session = self.active_session().await?;

        let description = format!("Purchase of {} course(s)", cart.len());
        let transaction = self
            .store
            .transact(total(&cart), &self.store.config().provider_address, &description)
            .await?;

        let enrollments: Vec<Enrollment> = cart
            .iter()
            .map(|item| self.enrollment(item, &session, &transaction, item.price))
            .collect();
        self.record_purchase(&transaction, &cart, &enrollments).await?;
        self.storage.remove(keys::CART).await?;

        info!(
            "checkout {} enrolled {} in {} course(s)",
            transaction.id,
            session.address,
            enrollments.len()
        );
        Ok(CheckoutReceipt {
            transaction,
            enrollments,
        })
    }

    /// Buys a single course directly, bypassing the cart.
    pub async fn enroll(&self, course: CartItem) -> Result<Enrollment> {
        let _records = self.records.lock().await;
        let session = self.active_session().await?;

        let existing: Vec<Enrollment> = load_list(self.storage.as_ref(), keys::ENROLLMENTS).await?;
        if existing.iter().any(|enrollment| {
            enrollment.course_id == course.course_id && enrollment.wallet_address == session.address
        }) {
            return Err(WalletError::AlreadyEnrolled(course.course_id));
        }

        let description = format!("Enrollment in {}", course.title);
        let transaction = self
            .store
            .transact(course.price, &self.store.config().provider_address, &description)
            .await?;

        let enrollment = self.enrollment(&course, &session, &transaction, course.price);
        self.record_purchase(
            &transaction,
            std::slice::from_ref(&course),
            std::slice::from_ref(&enrollment),
        )
        .await?;

        let mut cart = self.cart().await?;
        let before = cart.len();
        cart.retain(|item| item.course_id != course.course_id);
        if cart.len() != before {
            save_json(self.storage.as_ref(), keys::CART, &cart).await?;
        }

        info!("{} enrolled in course {}", session.address, course.course_id);
        Ok(enrollment)
    }

    pub async fn enrollments(&self) -> Result<Vec<Enrollment>> {
        Ok(load_list(self.storage.as_ref(), keys::ENROLLMENTS).await?)
    }

    pub async fn purchased_courses(&self) -> Result<Vec<CartItem>> {
        Ok(load_list(self.storage.as_ref(), keys::PURCHASED_COURSES).await?)
    }

    /// Completion percentage, zero when never recorded.
    pub async fn progress(&self, course_id: u64) -> Result<u8> {
        let stored: Option<u8> =
            load_json(self.storage.as_ref(), &keys::course_progress(course_id)).await?;
        Ok(stored.unwrap_or(0))
    }

    pub async fn set_progress(&self, course_id: u64, percent: u8) -> Result<()> {
        if percent > MAX_PROGRESS {
            return Err(WalletError::InvalidProgress);
        }
        save_json(
            self.storage.as_ref(),
            &keys::course_progress(course_id),
            &percent,
        )
        .await?;
        Ok(())
    }

    async fn active_session(&self) -> Result<WalletSession> {
        self.store.session().await.ok_or(WalletError::NotConnected)
    }

    fn enrollment(
        &self,
        course: &CartItem,
        session: &WalletSession,
        transaction: &Transaction,
        amount: Amount,
    ) -> Enrollment {
        Enrollment {
            course_id: course.course_id,
            course_title: course.title.clone(),
            wallet_address: session.address.clone(),
            enrollment_date: Utc::now(),
            transaction_id: transaction.id.clone(),
            amount,
            currency: self.store.config().currency.clone(),
        }
    }

    /// Runs after the payment went through; a failure here leaves a paid
    /// transaction without enrollment records, so its id is logged.
    async fn record_purchase(
        &self,
        transaction: &Transaction,
        courses: &[CartItem],
        enrollments: &[Enrollment],
    ) -> Result<()> {
        let recorded = self.write_purchase(courses, enrollments).await;
        if let Err(err) = &recorded {
            warn!(
                "transaction {} ({}) was paid but its enrollments were not recorded: {}",
                transaction.id,
                transaction.amount.format_crypto(&self.store.config().currency),
                err
            );
        }
        recorded
    }

    async fn write_purchase(&self, courses: &[CartItem], enrollments: &[Enrollment]) -> Result<()> {
        let mut purchased: Vec<CartItem> =
            load_list(self.storage.as_ref(), keys::PURCHASED_COURSES).await?;
        purchased.extend_from_slice(courses);
        save_json(self.storage.as_ref(), keys::PURCHASED_COURSES, &purchased).await?;

        let mut recorded: Vec<Enrollment> = load_list(self.storage.as_ref(), keys::ENROLLMENTS).await?;
        recorded.extend_from_slice(enrollments);
        save_json(self.storage.as_ref(), keys::ENROLLMENTS, &recorded).await?;
        Ok(())
    }
}

pub fn total(items: &[CartItem]) -> Amount {
    items
        .iter()
        .fold(Amount::ZERO, |sum, item| sum.saturating_add(item.price))
}
