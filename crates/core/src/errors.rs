use thiserror::Error;

/// Commerce rules a customer request can break. Repositories raise these from inside their
/// transactions and tool handlers turn them into the reply text.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("insufficient stock for `{product}`: requested {requested}, available {available}")]
    InsufficientStock { product: String, requested: u32, available: u32 },
    #[error("product `{product}` is no longer sold")]
    ProductUnavailable { product: String },
    #[error("order {order_number} is {status} and can no longer be cancelled")]
    NotCancellable { order_number: String, status: String },
}

impl DomainError {
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyCart => "Your cart is empty. Send 'products' to see the catalog.".to_owned(),
            Self::InsufficientStock { product, available: 0, .. } => {
                format!("Sorry, {product} is out of stock.")
            }
            Self::InsufficientStock { product, available, .. } => {
                format!("Sorry, only {available} units of {product} are available.")
            }
            Self::ProductUnavailable { product } => {
                format!("{product} is no longer available. Remove it from your cart and try again.")
            }
            Self::NotCancellable { order_number, status } => {
                format!("Order {order_number} is already {status} and can no longer be cancelled.")
            }
        }
    }
}

/// Rejections at the HTTP edge, before a turn starts.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. } => correlation_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{DomainError, InterfaceError};

    #[test]
    fn stock_messages_depend_on_what_is_left() {
        let none = DomainError::InsufficientStock {
            product: "Xarope".to_owned(),
            requested: 2,
            available: 0,
        };
        let some = DomainError::InsufficientStock {
            product: "Dipirona 500mg".to_owned(),
            requested: 4,
            available: 1,
        };

        assert_eq!(none.user_message(), "Sorry, Xarope is out of stock.");
        assert_eq!(some.user_message(), "Sorry, only 1 units of Dipirona 500mg are available.");
        assert_eq!(
            some.to_string(),
            "insufficient stock for `Dipirona 500mg`: requested 4, available 1"
        );
    }

    #[test]
    fn interface_errors_keep_their_correlation_id() {
        let interface = InterfaceError::BadRequest {
            message: "`identity` must not be empty".to_owned(),
            correlation_id: "req-3".to_owned(),
        };

        assert_eq!(interface.correlation_id(), "req-3");
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }
}
