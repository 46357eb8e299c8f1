//! The optimistic overlay builder.
//!
//! [`build_overlay`] is the single place speculative cart state is
//! computed. It merges the last adopted authoritative snapshot with the
//! current pending set and returns the view the presentation layer
//! renders. It is a pure function: no clocks, no randomness, no hidden
//! state. Synthetic line ids are derived from submission ids assigned at
//! registration, so identical inputs always produce an identical view.
//!
//! The builder never fails. Whatever is in flight, it produces a
//! best-effort view and leaves error signaling to the tracker layer.

use serde::Serialize;

use marmalade_core::{CartId, GiftCardId, LineId, MerchandiseId, Money};

use crate::cart::pending::{PendingMutation, TargetKey};
use crate::commerce::{
    Cart, CartAction, CartBuyerIdentity, CartCost, CartLine, CartLineInput, SelectedOption,
};

/// How the presentation layer should frame the cart.
///
/// `Loading` is the load-bearing distinction: a cart whose first add is
/// still in flight must not flash "your cart is empty".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CartViewStatus {
    /// No lines, nothing in flight that would create one.
    Empty,
    /// Every visible line is still speculative.
    Loading,
    /// At least one authoritative line exists.
    Active,
}

/// Whether a code entry is confirmed by the backend or still applying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CodeState {
    /// Present in the authoritative snapshot.
    Applied,
    /// Requested by a pending mutation, not yet confirmed.
    Pending,
}

/// A cart line as rendered: authoritative, patched, or synthetic.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewLine {
    /// Real backend id, or a synthetic `optimistic:` id for lines whose
    /// add has not settled.
    pub id: LineId,
    /// Variant being purchased.
    pub merchandise_id: MerchandiseId,
    /// Rendered quantity.
    pub quantity: i64,
    /// Display title, when known.
    pub title: Option<String>,
    /// Unit price, when known. Synthetic lines only have one if the
    /// client supplied display data with the add.
    pub unit_price: Option<Money>,
    /// Image URL, when known.
    pub image_url: Option<String>,
    /// Selected variant options.
    pub selected_options: Vec<SelectedOption>,
    /// quantity x unit price. Not authoritative once patched.
    pub line_total: Option<Money>,
    /// A mutation targeting this line is in flight; its controls should
    /// be disabled to avoid redundant identical submissions.
    pub pending: bool,
}

impl ViewLine {
    fn from_authoritative(line: &CartLine) -> Self {
        Self {
            id: line.id.clone(),
            merchandise_id: line.merchandise.id.clone(),
            quantity: line.quantity,
            title: Some(line.merchandise.title.clone()),
            unit_price: Some(line.cost.amount_per_quantity),
            image_url: line.merchandise.image_url.clone(),
            selected_options: line.merchandise.selected_options.clone(),
            line_total: Some(line.cost.total_amount),
            pending: false,
        }
    }

    fn synthetic(id: LineId, input: &CartLineInput) -> Self {
        let display = input.display.as_ref();
        let unit_price = display.and_then(|d| d.unit_price);
        Self {
            id,
            merchandise_id: input.merchandise_id.clone(),
            quantity: input.quantity,
            title: display.and_then(|d| d.title.clone()),
            unit_price,
            image_url: display.and_then(|d| d.image_url.clone()),
            selected_options: display.map(|d| d.selected_options.clone()).unwrap_or_default(),
            line_total: unit_price.map(|p| p.times(input.quantity)),
            pending: true,
        }
    }
}

/// A discount code as rendered.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewDiscountCode {
    /// The code.
    pub code: String,
    /// Applied or still applying.
    pub state: CodeState,
    /// Backend's applicability verdict. Authoritative-only: `None` while
    /// the code is pending.
    pub applicable: Option<bool>,
}

/// A gift card as rendered. Applied cards are known only by their masked
/// tail; pending ones are masked from the submitted code.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewGiftCard {
    /// Applied gift card id. `None` while pending.
    pub id: Option<GiftCardId>,
    /// Last characters of the code, for display.
    pub last_characters: String,
    /// Amount drawn from the card. Authoritative-only.
    pub amount_used: Option<Money>,
    /// Applied or still applying.
    pub state: CodeState,
}

/// The view the UI renders: authoritative truth plus pending patches.
///
/// Derived, never persisted. `total_quantity` always equals the sum of
/// line quantities.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimisticCartView {
    /// Empty, loading, or active.
    pub status: CartViewStatus,
    /// Authoritative cart id, once one exists.
    pub cart_id: Option<CartId>,
    /// Checkout URL from the authoritative snapshot.
    pub checkout_url: Option<String>,
    /// Sum of rendered line quantities.
    pub total_quantity: i64,
    /// True when any pending patch shaped this view. Monetary amounts are
    /// then estimates at best.
    pub provisional: bool,
    /// Subtotal. Authoritative when `provisional` is false; otherwise a
    /// naive quantity x unit price sum, or `None` when a unit price is
    /// unknown or currencies mix.
    pub subtotal: Option<Money>,
    /// Full cost breakdown. Only present when not provisional: tax and
    /// discount math is never speculated.
    pub cost: Option<CartCost>,
    /// Rendered lines, authoritative order then synthetic appends.
    pub lines: Vec<ViewLine>,
    /// Rendered discount codes.
    pub discount_codes: Vec<ViewDiscountCode>,
    /// Rendered gift cards.
    pub gift_card_codes: Vec<ViewGiftCard>,
    /// Buyer identity with pending merges applied.
    pub buyer_identity: Option<CartBuyerIdentity>,
}

/// Merge the authoritative snapshot with the pending set.
///
/// Patches apply in submission order. Settled-but-undropped records still
/// apply: their patch holds until a snapshot covering their settlement is
/// adopted, at which point the tracker drops them and the next rebuild
/// uses pure truth.
#[must_use]
pub fn build_overlay(
    authoritative: Option<&Cart>,
    pending: &[PendingMutation],
) -> OptimisticCartView {
    let mut lines: Vec<ViewLine> = authoritative
        .map(|cart| cart.lines.iter().map(ViewLine::from_authoritative).collect())
        .unwrap_or_default();

    let auth_discounts = authoritative.map_or(&[][..], |cart| cart.discount_codes.as_slice());
    let mut discount_codes: Vec<ViewDiscountCode> = auth_discounts
        .iter()
        .map(|d| ViewDiscountCode {
            code: d.code.clone(),
            state: CodeState::Applied,
            applicable: Some(d.applicable),
        })
        .collect();

    let mut gift_card_codes: Vec<ViewGiftCard> = authoritative
        .map(|cart| {
            cart.applied_gift_cards
                .iter()
                .map(|g| ViewGiftCard {
                    id: Some(g.id.clone()),
                    last_characters: g.last_characters.clone(),
                    amount_used: Some(g.amount_used),
                    state: CodeState::Applied,
                })
                .collect()
        })
        .unwrap_or_default();

    let mut buyer_identity = authoritative
        .and_then(|cart| cart.buyer_identity.clone())
        .unwrap_or_default();

    let provisional = pending.iter().any(|record| !record.action.is_noop());

    for record in pending {
        match &record.action {
            CartAction::LinesAdd { lines: inputs } => {
                for (index, input) in inputs.iter().enumerate() {
                    if input.quantity <= 0 {
                        continue;
                    }
                    let id = LineId::synthetic(&record.submission_id, index);
                    lines.push(ViewLine::synthetic(id, input));
                }
            }
            CartAction::LinesUpdate { lines: updates } => {
                for update in updates {
                    if update.quantity <= 0 {
                        // Update-to-zero removes the line, same as the backend
                        lines.retain(|line| line.id != update.id);
                    } else if let Some(line) = lines.iter_mut().find(|line| line.id == update.id) {
                        line.quantity = update.quantity;
                        line.line_total = line.unit_price.map(|p| p.times(update.quantity));
                    }
                }
            }
            CartAction::LinesRemove { line_ids } => {
                lines.retain(|line| !line_ids.contains(&line.id));
            }
            CartAction::DiscountCodesUpdate {
                discount_codes: requested,
            } => {
                discount_codes = requested
                    .iter()
                    .map(|code| {
                        // Codes already confirmed applied keep their verdict
                        match auth_discounts.iter().find(|d| d.code == *code) {
                            Some(d) => ViewDiscountCode {
                                code: code.clone(),
                                state: CodeState::Applied,
                                applicable: Some(d.applicable),
                            },
                            None => ViewDiscountCode {
                                code: code.clone(),
                                state: CodeState::Pending,
                                applicable: None,
                            },
                        }
                    })
                    .collect();
            }
            CartAction::GiftCardCodesUpdate {
                gift_card_codes: requested,
            } => {
                gift_card_codes = requested
                    .iter()
                    .map(|code| ViewGiftCard {
                        id: None,
                        last_characters: mask_code(code),
                        amount_used: None,
                        state: CodeState::Pending,
                    })
                    .collect();
            }
            CartAction::GiftCardCodesRemove {
                gift_card_codes: ids,
            } => {
                gift_card_codes
                    .retain(|card| card.id.as_ref().is_none_or(|id| !ids.contains(id)));
            }
            CartAction::BuyerIdentityUpdate {
                buyer_identity: input,
            } => {
                if input.email.is_some() {
                    buyer_identity.email.clone_from(&input.email);
                }
                if input.phone.is_some() {
                    buyer_identity.phone.clone_from(&input.phone);
                }
                if input.country_code.is_some() {
                    buyer_identity.country_code.clone_from(&input.country_code);
                }
                if input.company.is_some() {
                    buyer_identity.company.clone_from(&input.company);
                }
            }
        }
    }

    // Flag every line some record still targets, so its controls stay
    // disabled until that record settles
    let busy_keys: Vec<TargetKey> = pending.iter().flat_map(PendingMutation::target_keys).collect();
    for line in &mut lines {
        if busy_keys
            .iter()
            .any(|key| matches!(key, TargetKey::Line(id) if *id == line.id))
        {
            line.pending = true;
        }
    }

    let total_quantity = lines.iter().map(|line| line.quantity).sum();

    let pending_add = pending.iter().any(|record| match &record.action {
        CartAction::LinesAdd { lines } => lines.iter().any(|line| line.quantity > 0),
        _ => false,
    });
    let status = if lines.iter().any(|line| !line.id.is_synthetic()) {
        CartViewStatus::Active
    } else if !lines.is_empty() || pending_add {
        CartViewStatus::Loading
    } else {
        CartViewStatus::Empty
    };

    let (subtotal, cost) = if provisional {
        (naive_subtotal(&lines), None)
    } else {
        let cost = authoritative.map(|cart| cart.cost.clone());
        (cost.as_ref().map(|c| c.subtotal_amount), cost)
    };

    OptimisticCartView {
        status,
        cart_id: authoritative.map(|cart| cart.id.clone()),
        checkout_url: authoritative.map(|cart| cart.checkout_url.clone()),
        total_quantity,
        provisional,
        subtotal,
        cost,
        lines,
        discount_codes,
        gift_card_codes,
        buyer_identity: if identity_is_empty(&buyer_identity) {
            None
        } else {
            Some(buyer_identity)
        },
    }
}

/// Sum quantity x unit price across the patched lines. `None` when any
/// unit price is unknown or the lines mix currencies.
fn naive_subtotal(lines: &[ViewLine]) -> Option<Money> {
    let mut total: Option<Money> = None;
    for line in lines {
        let price = line.unit_price?;
        let line_total = price.times(line.quantity);
        total = Some(match total {
            None => line_total,
            Some(acc) => acc.add(&line_total).ok()?,
        });
    }
    total
}

fn identity_is_empty(identity: &CartBuyerIdentity) -> bool {
    identity.email.is_none()
        && identity.phone.is_none()
        && identity.country_code.is_none()
        && identity.company.is_none()
}

/// Last four characters of a submitted gift card code, matching the
/// backend's masking of applied cards.
fn mask_code(code: &str) -> String {
    let count = code.chars().count();
    code.chars().skip(count.saturating_sub(4)).collect()
}
