//! Data models for the customer service.
//!
//! - `CustomerDto`, `Gender`: customers as returned by the API
//! - `CustomerRegistrationRequest`, `CustomerUpdateRequest`: request bodies
//! - `UsernamePassword`: sign-in credentials
//! - `validation`: client-side form rules for the above

pub mod customer;
pub mod validation;

pub use customer::{
    CustomerDto, CustomerRegistrationRequest, CustomerUpdateRequest, Gender, UsernamePassword,
};
pub use validation::{FieldError, Validate};
