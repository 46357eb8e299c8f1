//! Domain types for the commerce backend's cart API.
//!
//! These are the wire types: every struct serializes in the backend's
//! camelCase JSON form, so no separate conversion layer is needed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use marmalade_core::{CartId, GiftCardId, LineId, MerchandiseId, Money};

// =============================================================================
// Cart Snapshot Types
// =============================================================================

/// A selected option on a purchasable variant (e.g., "Size" / "Large").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedOption {
    /// Option name.
    pub name: String,
    /// Selected value.
    pub value: String,
}

/// Merchandise display snapshot captured by the backend for a cart line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartMerchandise {
    /// Variant ID.
    pub id: MerchandiseId,
    /// Variant title.
    pub title: String,
    /// Current unit price.
    pub price: Money,
    /// Variant image URL.
    pub image_url: Option<String>,
    /// Selected options for this variant.
    #[serde(default)]
    pub selected_options: Vec<SelectedOption>,
}

/// Cost for a cart line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineCost {
    /// Price per unit.
    pub amount_per_quantity: Money,
    /// Total (after discounts).
    pub total_amount: Money,
}

/// A line item in the cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Cart line ID, assigned by the backend.
    pub id: LineId,
    /// Quantity. A line with quantity 0 does not exist.
    pub quantity: i64,
    /// Line cost.
    pub cost: CartLineCost,
    /// Merchandise display snapshot.
    pub merchandise: CartMerchandise,
}

/// Cart cost summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartCost {
    /// Subtotal before tax.
    pub subtotal_amount: Money,
    /// Total tax amount, when known.
    pub total_tax_amount: Option<Money>,
    /// Total amount.
    pub total_amount: Money,
}

/// Discount code applied to the cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartDiscountCode {
    /// The discount code.
    pub code: String,
    /// Whether the code is applicable. Authoritative-only: the overlay
    /// renders newly requested codes as pending instead.
    pub applicable: bool,
}

/// A gift card applied to the cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedGiftCard {
    /// Applied gift card ID.
    pub id: GiftCardId,
    /// Last characters of the gift card code, for display.
    pub last_characters: String,
    /// Amount of the gift card used by this cart.
    pub amount_used: Money,
}

/// Buyer identity attached to the cart. All fields are partial.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartBuyerIdentity {
    /// Email address.
    pub email: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
    /// Country code.
    pub country_code: Option<String>,
    /// Company name.
    pub company: Option<String>,
}

/// The authoritative cart aggregate, owned by the commerce backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    /// Cart ID.
    pub id: CartId,
    /// Checkout URL.
    pub checkout_url: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Total item quantity. Always equals the sum of line quantities.
    pub total_quantity: i64,
    /// Buyer identity.
    pub buyer_identity: Option<CartBuyerIdentity>,
    /// Cart cost summary.
    pub cost: CartCost,
    /// Applied discount codes.
    #[serde(default)]
    pub discount_codes: Vec<CartDiscountCode>,
    /// Applied gift cards.
    #[serde(default)]
    pub applied_gift_cards: Vec<AppliedGiftCard>,
    /// Cart lines.
    #[serde(default)]
    pub lines: Vec<CartLine>,
}

// =============================================================================
// Action Input Types
// =============================================================================

/// Client-known display data for a line being added, used only by the
/// optimistic overlay until the backend's own snapshot arrives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineDisplay {
    /// Variant title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Unit price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Money>,
    /// Variant image URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Selected options.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_options: Vec<SelectedOption>,
}

/// Input for adding a line to the cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineInput {
    /// Product variant ID.
    pub merchandise_id: MerchandiseId,
    /// Quantity to add.
    pub quantity: i64,
    /// Optional display data for the overlay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<LineDisplay>,
}

/// Input for updating a cart line's quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineUpdateInput {
    /// Cart line ID.
    pub id: LineId,
    /// New quantity. Zero removes the line.
    pub quantity: i64,
}

/// Partial buyer identity update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerIdentityInput {
    /// Email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Phone number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Country code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    /// Company name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

/// The seven cart mutation kinds.
///
/// This is a closed enum: an action name outside this set fails to decode
/// at the HTTP boundary and never reaches the backend. Dispatch over it is
/// exhaustiveness-checked, so adding a variant forces every consumer to
/// handle it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", content = "inputs")]
pub enum CartAction {
    /// Add new lines to the cart.
    #[serde(rename_all = "camelCase")]
    LinesAdd {
        #[serde(default)]
        lines: Vec<CartLineInput>,
    },
    /// Replace quantities on existing lines.
    #[serde(rename_all = "camelCase")]
    LinesUpdate {
        #[serde(default)]
        lines: Vec<CartLineUpdateInput>,
    },
    /// Remove lines from the cart.
    #[serde(rename_all = "camelCase")]
    LinesRemove {
        #[serde(default)]
        line_ids: Vec<LineId>,
    },
    /// Replace the set of discount codes.
    #[serde(rename_all = "camelCase")]
    DiscountCodesUpdate {
        #[serde(default)]
        discount_codes: Vec<String>,
    },
    /// Replace the set of gift card codes.
    #[serde(rename_all = "camelCase")]
    GiftCardCodesUpdate {
        #[serde(default)]
        gift_card_codes: Vec<String>,
    },
    /// Remove applied gift cards by id.
    #[serde(rename_all = "camelCase")]
    GiftCardCodesRemove {
        #[serde(default)]
        gift_card_codes: Vec<GiftCardId>,
    },
    /// Merge partial buyer identity fields into the cart.
    #[serde(rename_all = "camelCase")]
    BuyerIdentityUpdate { buyer_identity: BuyerIdentityInput },
}

impl CartAction {
    /// The action's wire name, for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::LinesAdd { .. } => "LinesAdd",
            Self::LinesUpdate { .. } => "LinesUpdate",
            Self::LinesRemove { .. } => "LinesRemove",
            Self::DiscountCodesUpdate { .. } => "DiscountCodesUpdate",
            Self::GiftCardCodesUpdate { .. } => "GiftCardCodesUpdate",
            Self::GiftCardCodesRemove { .. } => "GiftCardCodesRemove",
            Self::BuyerIdentityUpdate { .. } => "BuyerIdentityUpdate",
        }
    }

    /// Whether the action carries an empty input list and therefore cannot
    /// change any line or code. Used by the revalidation coordinator to
    /// skip the follow-up refresh.
    ///
    /// `DiscountCodesUpdate` and `GiftCardCodesUpdate` with an empty list
    /// are NOT no-ops: they clear the respective code list.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        match self {
            Self::LinesAdd { lines } => lines.is_empty(),
            Self::LinesUpdate { lines } => lines.is_empty(),
            Self::LinesRemove { line_ids } => line_ids.is_empty(),
            Self::GiftCardCodesRemove { gift_card_codes } => gift_card_codes.is_empty(),
            Self::DiscountCodesUpdate { .. }
            | Self::GiftCardCodesUpdate { .. }
            | Self::BuyerIdentityUpdate { .. } => false,
        }
    }

    /// Drop synthetic line ids from the action's targets.
    ///
    /// Synthetic ids exist only in overlay views; a form rendered from an
    /// overlay may echo one back before the real id is known. The backend
    /// has never seen such an id, so it is filtered out before dispatch.
    #[must_use]
    pub fn without_synthetic_targets(self) -> Self {
        match self {
            Self::LinesUpdate { lines } => Self::LinesUpdate {
                lines: lines
                    .into_iter()
                    .filter(|line| !line.id.is_synthetic())
                    .collect(),
            },
            Self::LinesRemove { line_ids } => Self::LinesRemove {
                line_ids: line_ids
                    .into_iter()
                    .filter(|id| !id.is_synthetic())
                    .collect(),
            },
            other => other,
        }
    }
}

// =============================================================================
// Mutation Response Types
// =============================================================================

/// User error from a cart mutation: the backend understood the request but
/// rejected it. The mutation did not apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartUserError {
    /// Error code.
    pub code: Option<String>,
    /// Field path that caused the error.
    pub field: Option<Vec<String>>,
    /// Human-readable error message.
    pub message: String,
}

/// Warning from a cart mutation: the mutation applied, possibly partially.
/// The returned cart is still authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartWarning {
    /// Warning code.
    pub code: Option<String>,
    /// The line or code the warning is about.
    pub target: Option<String>,
    /// Human-readable warning message.
    pub message: String,
}

/// Result of a cart mutation or fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationOutcome {
    /// Updated cart snapshot. Absent when the mutation was rejected and no
    /// cart exists yet, or when a fetched cart was not found.
    pub cart: Option<Cart>,
    /// Errors: the mutation did not apply.
    #[serde(default)]
    pub errors: Vec<CartUserError>,
    /// Warnings: partial success, cart adopted as-is.
    #[serde(default)]
    pub warnings: Vec<CartWarning>,
}

impl MutationOutcome {
    /// Whether the backend rejected the mutation.
    #[must_use]
    pub fn rejected(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_action_decodes_from_tagged_envelope() {
        let value = serde_json::json!({
            "action": "LinesAdd",
            "inputs": {
                "lines": [{"merchandiseId": "gid://variant/1", "quantity": 2}]
            }
        });
        let action: CartAction = serde_json::from_value(value).unwrap();
        match action {
            CartAction::LinesAdd { lines } => {
                assert_eq!(lines.len(), 1);
                assert_eq!(lines[0].quantity, 2);
                assert_eq!(lines[0].merchandise_id.as_str(), "gid://variant/1");
            }
            other => panic!("decoded wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_action_fails_to_decode() {
        let value = serde_json::json!({"action": "Bogus", "inputs": {}});
        assert!(serde_json::from_value::<CartAction>(value).is_err());
    }

    #[test]
    fn test_gift_card_remove_uses_code_list_field_name() {
        let value = serde_json::json!({
            "action": "GiftCardCodesRemove",
            "inputs": {"giftCardCodes": ["gid://gift-card/9"]}
        });
        let action: CartAction = serde_json::from_value(value).unwrap();
        match action {
            CartAction::GiftCardCodesRemove { gift_card_codes } => {
                assert_eq!(gift_card_codes, vec![GiftCardId::new("gid://gift-card/9")]);
            }
            other => panic!("decoded wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_noop_detection() {
        assert!(CartAction::LinesAdd { lines: vec![] }.is_noop());
        assert!(CartAction::LinesRemove { line_ids: vec![] }.is_noop());
        // Clearing the code list is a real mutation
        assert!(
            !CartAction::DiscountCodesUpdate {
                discount_codes: vec![]
            }
            .is_noop()
        );
        assert!(
            !CartAction::LinesAdd {
                lines: vec![CartLineInput {
                    merchandise_id: MerchandiseId::new("m"),
                    quantity: 1,
                    display: None,
                }]
            }
            .is_noop()
        );
    }

    #[test]
    fn test_synthetic_targets_are_dropped() {
        let submission = marmalade_core::SubmissionId::new("s1");
        let action = CartAction::LinesRemove {
            line_ids: vec![
                LineId::synthetic(&submission, 0),
                LineId::new("gid://cart-line/7"),
            ],
        };
        match action.without_synthetic_targets() {
            CartAction::LinesRemove { line_ids } => {
                assert_eq!(line_ids, vec![LineId::new("gid://cart-line/7")]);
            }
            other => panic!("variant changed: {other:?}"),
        }
    }

    #[test]
    fn test_cart_serializes_in_camel_case() {
        let cart = Cart {
            id: CartId::new("gid://cart/1"),
            checkout_url: "https://example.test/checkout".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            total_quantity: 0,
            buyer_identity: None,
            cost: CartCost {
                subtotal_amount: Money::zero(marmalade_core::CurrencyCode::USD),
                total_tax_amount: None,
                total_amount: Money::zero(marmalade_core::CurrencyCode::USD),
            },
            discount_codes: vec![],
            applied_gift_cards: vec![],
            lines: vec![],
        };
        let json = serde_json::to_value(&cart).unwrap();
        assert!(json.get("totalQuantity").is_some());
        assert!(json.get("checkoutUrl").is_some());
        assert!(json["cost"].get("subtotalAmount").is_some());
    }

    #[test]
    fn test_outcome_defaults_error_and_warning_lists() {
        let outcome: MutationOutcome = serde_json::from_value(serde_json::json!({
            "cart": null
        }))
        .unwrap();
        assert!(outcome.errors.is_empty());
        assert!(outcome.warnings.is_empty());
        assert!(!outcome.rejected());
    }
}
