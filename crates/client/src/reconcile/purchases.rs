use std::collections::BTreeMap;

use crate::net::wire::PurchaseRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchasePhase {
    Pending,
    Confirmed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseOrder {
    pub purchase_id: i64,
    pub item_label: String,
    pub price: u32,
    pub phase: PurchasePhase,
}

/// Two-phase purchase confirmation, keyed by purchase id. Each transition
/// applies at most once, so replayed buy-item / buy-item-confirmed events
/// change nothing.
#[derive(Debug, Default)]
pub struct PurchaseLedger {
    orders: BTreeMap<i64, PurchaseOrder>,
}

impl PurchaseLedger {
    pub fn order(&self, purchase_id: i64) -> Option<&PurchaseOrder> {
        self.orders.get(&purchase_id)
    }

    pub fn pending_count(&self) -> usize {
        self.phase_count(PurchasePhase::Pending)
    }

    pub fn confirmed_count(&self) -> usize {
        self.phase_count(PurchasePhase::Confirmed)
    }

    fn phase_count(&self, phase: PurchasePhase) -> usize {
        self.orders
            .values()
            .filter(|order| order.phase == phase)
            .count()
    }

    /// Phase one: records the pending order. Returns false when the
    /// purchase id is already known.
    pub fn begin(&mut self, purchase: &PurchaseRecord) -> bool {
        if self.orders.contains_key(&purchase.purchase_id) {
            return false;
        }
        self.orders.insert(
            purchase.purchase_id,
            PurchaseOrder {
                purchase_id: purchase.purchase_id,
                item_label: purchase.item_label.clone(),
                price: purchase.price,
                phase: PurchasePhase::Pending,
            },
        );
        true
    }

    /// Phase two: commits a pending order. Returns the order only on the
    /// Pending -> Confirmed transition; unknown or already-confirmed ids
    /// return None.
    pub fn confirm(&mut self, purchase_id: i64) -> Option<PurchaseOrder> {
        let order = self.orders.get_mut(&purchase_id)?;
        if order.phase == PurchasePhase::Confirmed {
            return None;
        }
        order.phase = PurchasePhase::Confirmed;
        Some(order.clone())
    }

    pub fn clear(&mut self) {
        self.orders.clear();
    }
}
