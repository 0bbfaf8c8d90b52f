//! Shopping cart.
//!
//! Lines are keyed by product and keep the order they were first added in,
//! which is also the order vendor groups are placed in.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use campus_core::{ProductId, VendorId, discounted_unit_price, line_subtotal, round_money};

/// One product in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
    /// Percentage off `unit_price`, `0..=100`.
    pub discount_percentage: Decimal,
    pub quantity: u32,
    pub vendor_id: VendorId,
}

impl CartLine {
    /// Unit price after discount, rounded to cents.
    #[must_use]
    pub fn discounted_unit_price(&self) -> Decimal {
        discounted_unit_price(self.unit_price, self.discount_percentage)
    }

    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        line_subtotal(self.unit_price, self.discount_percentage, self.quantity)
    }
}

/// The lines of one vendor; placed as exactly one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorGroup {
    pub vendor_id: VendorId,
    pub lines: Vec<CartLine>,
}

impl VendorGroup {
    /// Sum of the group's line subtotals.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(CartLine::subtotal).sum()
    }
}

/// Client-owned cart for one shopping session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a line. Adding a product already in the cart increases its quantity.
    /// A zero quantity is ignored.
    pub fn add(&mut self, line: CartLine) {
        if line.quantity == 0 {
            return;
        }
        match self.position(line.product_id) {
            Some(index) => {
                if let Some(existing) = self.lines.get_mut(index) {
                    existing.quantity = existing.quantity.saturating_add(line.quantity);
                }
            }
            None => self.lines.push(line),
        }
    }

    /// Set a product's quantity; zero removes it. Returns false if the product
    /// is not in the cart.
    pub fn set_quantity(&mut self, product_id: ProductId, quantity: u32) -> bool {
        let Some(index) = self.position(product_id) else {
            return false;
        };
        if quantity == 0 {
            self.lines.remove(index);
        } else if let Some(line) = self.lines.get_mut(index) {
            line.quantity = quantity;
        }
        true
    }

    /// Remove a product, returning its line.
    pub fn remove(&mut self, product_id: ProductId) -> Option<CartLine> {
        self.position(product_id).map(|index| self.lines.remove(index))
    }

    /// Remove every line belonging to a vendor.
    pub fn remove_vendor(&mut self, vendor_id: VendorId) {
        self.lines.retain(|line| line.vendor_id != vendor_id);
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0u32, |acc, line| acc.saturating_add(line.quantity))
    }

    /// Sum of discounted line subtotals.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(CartLine::subtotal).sum()
    }

    /// Service fee for the whole cart: `subtotal * rate`, rounded to cents.
    #[must_use]
    pub fn service_fee(&self, rate: Decimal) -> Decimal {
        round_money(self.subtotal() * rate)
    }

    /// Partition lines by vendor, in order of each vendor's first line.
    #[must_use]
    pub fn vendor_groups(&self) -> Vec<VendorGroup> {
        let mut groups: Vec<VendorGroup> = Vec::new();
        for line in &self.lines {
            match groups.iter_mut().find(|g| g.vendor_id == line.vendor_id) {
                Some(group) => group.lines.push(line.clone()),
                None => groups.push(VendorGroup {
                    vendor_id: line.vendor_id,
                    lines: vec![line.clone()],
                }),
            }
        }
        groups
    }

    fn position(&self, product_id: ProductId) -> Option<usize> {
        self.lines.iter().position(|l| l.product_id == product_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(vendor: VendorId, price: i64, discount: i64, quantity: u32) -> CartLine {
        CartLine {
            product_id: ProductId::random(),
            name: "Masala Dosa".to_owned(),
            unit_price: Decimal::from(price),
            discount_percentage: Decimal::from(discount),
            quantity,
            vendor_id: vendor,
        }
    }

    #[test]
    fn test_add_merges_same_product() {
        let vendor = VendorId::random();
        let mut cart = Cart::new();
        let first = line(vendor, 40, 0, 1);
        let mut again = first.clone();
        again.quantity = 2;

        cart.add(first);
        cart.add(again);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.item_count(), 3);
    }

    #[test]
    fn test_zero_quantity_removes() {
        let mut cart = Cart::new();
        let l = line(VendorId::random(), 40, 0, 1);
        let id = l.product_id;
        cart.add(l);

        assert!(cart.set_quantity(id, 5));
        assert_eq!(cart.item_count(), 5);
        assert!(cart.set_quantity(id, 0));
        assert!(cart.is_empty());
        assert!(!cart.set_quantity(id, 1));
    }

    #[test]
    fn test_subtotal_applies_discount() {
        let mut cart = Cart::new();
        // 100 at 10% off, twice
        cart.add(line(VendorId::random(), 100, 10, 2));
        cart.add(line(VendorId::random(), 25, 0, 1));
        assert_eq!(cart.subtotal(), Decimal::from(205));
    }

    #[test]
    fn test_service_fee_rounds() {
        let mut cart = Cart::new();
        cart.add(line(VendorId::random(), 33, 0, 1));
        // 33 * 0.05 = 1.65
        assert_eq!(cart.service_fee(Decimal::new(5, 2)), Decimal::new(165, 2));
    }

    #[test]
    fn test_vendor_groups_keep_first_appearance_order() {
        let x = VendorId::random();
        let y = VendorId::random();
        let mut cart = Cart::new();
        cart.add(line(y, 10, 0, 1));
        cart.add(line(x, 20, 0, 1));
        cart.add(line(y, 5, 0, 2));

        let groups = cart.vendor_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].vendor_id, y);
        assert_eq!(groups[0].lines.len(), 2);
        assert_eq!(groups[0].subtotal(), Decimal::from(20));
        assert_eq!(groups[1].vendor_id, x);
    }

    #[test]
    fn test_remove_vendor() {
        let x = VendorId::random();
        let mut cart = Cart::new();
        cart.add(line(x, 10, 0, 1));
        cart.add(line(VendorId::random(), 10, 0, 1));
        cart.remove_vendor(x);
        assert_eq!(cart.lines().len(), 1);
    }
}
