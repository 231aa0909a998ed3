//! Stories about tenants joining and leaving the platform
//!
//! - `registration`: a tenant registers, including every way registration
//!   can fail and what is left behind when it does
//! - `unregistration`: a tenant leaves, and only that tenant's objects go
//!   with it

mod fakes;
mod registration;
mod unregistration;
