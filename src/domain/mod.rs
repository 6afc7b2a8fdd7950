//! Domain types: catalog, customers, orders, payments, discount rules, and
//! currency arithmetic.

pub mod customer;
pub mod discount;
pub mod money;
pub mod order;
pub mod payment;
pub mod product;

pub use customer::{CheckoutCustomer, Customer, NewCustomer};
pub use discount::{
    AppliedRule, CustomerContext, DiscountCondition, DiscountDecision, DiscountRule,
    RuleCondition, RuleWithConditions,
};
pub use order::{CartLine, Order, OrderItem, OrderStatus, UnknownStatus, ValidatedLine};
pub use payment::{Payment, PaymentStatus};
pub use product::{NewProduct, Product};
