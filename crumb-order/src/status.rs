use crumb_core::OrderStatus;

/// An order may stay where it is or advance exactly one step. Moving back
/// to an earlier status is not restricted.
pub fn can_transition(current: OrderStatus, next: OrderStatus) -> bool {
    next.position() <= current.position() + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn test_single_step_forward() {
        assert!(can_transition(Pending, Confirmed));
        assert!(can_transition(Confirmed, Shipping));
        assert!(can_transition(Shipping, Delivered));
    }

    #[test]
    fn test_skipping_is_rejected() {
        assert!(!can_transition(Pending, Shipping));
        assert!(!can_transition(Pending, Delivered));
        assert!(!can_transition(Confirmed, Delivered));
    }

    #[test]
    fn test_same_status_is_allowed() {
        for status in OrderStatus::ALL {
            assert!(can_transition(status, status));
        }
    }

    #[test]
    fn test_backward_moves_are_allowed() {
        assert!(can_transition(Delivered, Pending));
        assert!(can_transition(Shipping, Confirmed));
    }
}
