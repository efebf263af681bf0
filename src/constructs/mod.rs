//! Constructs: typed builders that declare one or more resources on a
//! [`Stack`](crate::stack::Stack) and hand back a handle with the tokens
//! other constructs need to wire against.
//!
//! Each constructor takes the stack, a construct path and a props struct,
//! registers its resources immediately and fails with
//! [`Error::Validation`](crate::error::Error::Validation) when the props
//! cannot be synthesized.

pub mod ec2;
pub mod iam;
pub mod rds;
pub mod secretsmanager;
