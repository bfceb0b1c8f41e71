//! Validation of client-submitted checkout payloads
//!
//! Nothing in here touches storage: a payload either becomes a
//! [`CheckoutDraft`] or is rejected with a [`ValidationError`].

use crate::error::ValidationError;
use crate::orders::models::{NewOrder, NewOrderItem, OrderIdentifiers, Payer};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::sync::LazyLock;

pub const PHONE_DIGITS: usize = 11;
pub const MAX_CART_ITEMS: usize = 100;
pub const MAX_ITEM_QUANTITY: i64 = 10_000;
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;
/// Largest value a `NUMERIC(12, 2)` money column holds
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$")
        .expect("email pattern is valid")
});

/// Body of `POST /wata`
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_email: String,
    #[serde(default)]
    pub user_phone: String,
    #[serde(default)]
    pub user_address: Option<String>,
    #[serde(default)]
    pub order_comment: Option<String>,
    #[serde(default)]
    pub cart_items: Vec<CartItem>,
    #[serde(default)]
    pub success_url: Option<String>,
    #[serde(default)]
    pub fail_url: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CartItem {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub quantity: i64,
}

/// Accepts `"42"` and `42` alike
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectUrls {
    pub success: Option<String>,
    pub fail: Option<String>,
}

/// A checkout payload that passed validation, not yet assigned identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutDraft {
    pub payer: Payer,
    pub comment: Option<String>,
    pub amount: Decimal,
    pub items: Vec<NewOrderItem>,
    pub redirects: RedirectUrls,
    pub idempotency_key: Option<String>,
}

impl CheckoutDraft {
    pub fn into_new_order(&self, ids: OrderIdentifiers, currency: &str) -> NewOrder {
        NewOrder {
            order_number: ids.order_number,
            provider_order_id: ids.provider_order_id,
            payer: self.payer.clone(),
            comment: self.comment.clone(),
            amount: self.amount,
            currency: currency.to_string(),
            idempotency_key: self.idempotency_key.clone(),
            items: self.items.clone(),
        }
    }
}

impl CreatePaymentRequest {
    /// `idempotency_key` overrides the body field when the caller sent the header
    pub fn validate(self, idempotency_key: Option<String>) -> Result<CheckoutDraft, ValidationError> {
        let amount = money("amount", self.amount)?;

        let name = required_text("user_name", &self.user_name, 255)?;
        let email = validate_email(&self.user_email)?;
        let phone = normalize_phone(&self.user_phone)?;
        let address = optional_text("user_address", self.user_address.as_deref(), 500)?;
        let comment = optional_text("order_comment", self.order_comment.as_deref(), 1000)?;

        if self.cart_items.is_empty() {
            return Err(ValidationError::new("cart_items", "Cart must not be empty"));
        }
        if self.cart_items.len() > MAX_CART_ITEMS {
            return Err(ValidationError::new(
                "cart_items",
                format!("Cart may contain at most {} items", MAX_CART_ITEMS),
            ));
        }

        let items = self
            .cart_items
            .iter()
            .enumerate()
            .map(|(index, item)| validate_item(index, item))
            .collect::<Result<Vec<_>, _>>()?;

        let cart_total = items
            .iter()
            .enumerate()
            .try_fold(Decimal::ZERO, |total, (index, item)| {
                item.line_total()
                    .and_then(|line| total.checked_add(line))
                    .filter(|total| *total <= MAX_AMOUNT)
                    .ok_or_else(|| {
                        ValidationError::new(
                            format!("cart_items[{}].price", index),
                            format!("Cart total must not exceed {}", MAX_AMOUNT),
                        )
                    })
            })?;
        if cart_total.round_dp(2) != amount {
            return Err(ValidationError::new(
                "amount",
                format!("Amount {} does not match cart total {}", amount, cart_total.round_dp(2)),
            ));
        }

        let redirects = RedirectUrls {
            success: optional_url("success_url", self.success_url.as_deref())?,
            fail: optional_url("fail_url", self.fail_url.as_deref())?,
        };

        let idempotency_key = match idempotency_key.or(self.idempotency_key) {
            Some(key) => {
                let key = key.trim().to_string();
                if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
                    return Err(ValidationError::new(
                        "idempotency_key",
                        format!("Idempotency key must be 1 to {} characters", MAX_IDEMPOTENCY_KEY_LEN),
                    ));
                }
                Some(key)
            }
            None => None,
        };

        Ok(CheckoutDraft {
            payer: Payer {
                name,
                email,
                phone,
                address,
            },
            comment,
            amount,
            items,
            redirects,
            idempotency_key,
        })
    }
}

fn validate_item(index: usize, item: &CartItem) -> Result<NewOrderItem, ValidationError> {
    let field = |name: &str| format!("cart_items[{}].{}", index, name);

    let product_id = item.id.trim();
    if product_id.is_empty() {
        return Err(ValidationError::new(field("id"), "Product id is required"));
    }
    let name = required_text(&field("name"), &item.name, 255)?;

    let unit_price = money(&field("price"), item.price)?;
    if item.quantity <= 0 || item.quantity > MAX_ITEM_QUANTITY {
        return Err(ValidationError::new(
            field("quantity"),
            format!("Quantity must be between 1 and {}", MAX_ITEM_QUANTITY),
        ));
    }

    Ok(NewOrderItem {
        product_id: product_id.to_string(),
        name,
        unit_price,
        // bounded above
        quantity: item.quantity as i32,
    })
}

/// Rounds to kopecks and checks the value fits a money column
fn money(field: &str, value: Decimal) -> Result<Decimal, ValidationError> {
    let value = value.round_dp(2);
    if value <= Decimal::ZERO {
        return Err(ValidationError::new(field, "Value must be greater than 0"));
    }
    if value > MAX_AMOUNT {
        return Err(ValidationError::new(
            field,
            format!("Value must not exceed {}", MAX_AMOUNT),
        ));
    }
    Ok(value)
}

pub fn validate_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim();
    if email.is_empty() {
        return Err(ValidationError::new("user_email", "Email is required"));
    }
    if email.len() > 254 || !EMAIL_RE.is_match(email) {
        return Err(ValidationError::new("user_email", "Email address is invalid"));
    }
    Ok(email.to_string())
}

/// Strips everything but digits; the result must be exactly 11 digits long
pub fn normalize_phone(raw: &str) -> Result<String, ValidationError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != PHONE_DIGITS {
        return Err(ValidationError::new(
            "user_phone",
            format!("Phone number must contain exactly {} digits", PHONE_DIGITS),
        ));
    }
    Ok(digits)
}

fn required_text(field: &str, raw: &str, max_len: usize) -> Result<String, ValidationError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ValidationError::new(field, "Value is required"));
    }
    if value.chars().count() > max_len {
        return Err(ValidationError::new(
            field,
            format!("Value must be at most {} characters", max_len),
        ));
    }
    Ok(value.to_string())
}

fn optional_text(field: &str, raw: Option<&str>, max_len: usize) -> Result<Option<String>, ValidationError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => required_text(field, value, max_len).map(Some),
        None => Ok(None),
    }
}

fn optional_url(field: &str, raw: Option<&str>) -> Result<Option<String>, ValidationError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(url) if url.starts_with("https://") || url.starts_with("http://") => {
            Ok(Some(url.to_string()))
        }
        Some(_) => Err(ValidationError::new(field, "Redirect URL must be an http(s) URL")),
        None => Ok(None),
    }
}
