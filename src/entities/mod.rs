pub mod cart_item;
pub mod category;
pub mod favorite;
pub mod inventory_movement;
pub mod order;
pub mod order_line;
pub mod product;
pub mod supply_item;

pub use order::OrderStatus;
pub use inventory_movement::MovementDirection;

use rust_decimal::Decimal;

/// Precision and scale of a fixed-point column. Values are checked against
/// these before they are written, since SQLite stores whatever it is given
/// and Postgres rounds or rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalColumn {
    pub precision: u32,
    pub scale: u32,
}

impl DecimalColumn {
    /// Product prices, line unit prices and supply purchase prices
    pub const PRICE: Self = Self::new(12, 2);
    /// Order totals
    pub const TOTAL: Self = Self::new(14, 2);
    /// Supply quantities and movement quantities
    pub const QUANTITY: Self = Self::new(12, 3);

    pub const fn new(precision: u32, scale: u32) -> Self {
        Self { precision, scale }
    }

    /// Largest magnitude the column can store
    pub fn max(self) -> Decimal {
        Decimal::new(10_i64.pow(self.precision) - 1, self.scale)
    }

    /// Fits without rounding and without exceeding the integer digits
    pub fn holds(self, value: Decimal) -> bool {
        value.normalize().scale() <= self.scale && value.abs() <= self.max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn price_column_bounds() {
        assert_eq!(DecimalColumn::PRICE.max(), dec!(9999999999.99));
        assert!(DecimalColumn::PRICE.holds(dec!(32000)));
        assert!(DecimalColumn::PRICE.holds(dec!(2500.50)));
        assert!(!DecimalColumn::PRICE.holds(dec!(2500.505)));
        assert!(!DecimalColumn::PRICE.holds(dec!(10000000000)));
        assert!(!DecimalColumn::PRICE.holds(Decimal::MAX));
    }

    #[test]
    fn quantity_column_keeps_three_decimals() {
        assert!(DecimalColumn::QUANTITY.holds(dec!(0.125)));
        assert!(DecimalColumn::QUANTITY.holds(dec!(12.5000)));
        assert!(!DecimalColumn::QUANTITY.holds(dec!(0.0001)));
        assert!(!DecimalColumn::QUANTITY.holds(dec!(1000000000)));
    }
}
