//! Compiled boolean predicates

use std::fmt;
use std::sync::Arc;

use super::operator::Concat;

/// A compiled, shareable boolean predicate over `T`
///
/// Predicates are built once (by the filter builder or a rule builder) and
/// evaluated many times. Cloning is cheap.
pub struct Predicate<T> {
    func: Arc<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        Self {
            func: Arc::clone(&self.func),
        }
    }
}

impl<T> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("ptr", &Arc::as_ptr(&self.func).cast::<()>())
            .finish()
    }
}

impl<T: 'static> Predicate<T> {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
        }
    }

    /// A predicate that accepts everything
    pub fn always() -> Self {
        Self::new(|_| true)
    }

    #[inline]
    pub fn evaluate(&self, item: &T) -> bool {
        (self.func)(item)
    }

    pub fn and(self, other: Predicate<T>) -> Self {
        Self::new(move |item| self.evaluate(item) && other.evaluate(item))
    }

    pub fn or(self, other: Predicate<T>) -> Self {
        Self::new(move |item| self.evaluate(item) || other.evaluate(item))
    }

    pub fn and_not(self, other: Predicate<T>) -> Self {
        Self::new(move |item| self.evaluate(item) && !other.evaluate(item))
    }

    pub fn or_not(self, other: Predicate<T>) -> Self {
        Self::new(move |item| self.evaluate(item) || !other.evaluate(item))
    }

    pub fn not(self) -> Self {
        Self::new(move |item| !self.evaluate(item))
    }

    /// Join `other` onto this predicate with a concat operator
    pub fn combine(self, concat: Concat, other: Predicate<T>) -> Self {
        match concat {
            Concat::And => self.and(other),
            Concat::Or => self.or(other),
            Concat::AndNot => self.and_not(other),
            Concat::OrNot => self.or_not(other),
        }
    }

    /// Items of `items` the predicate accepts, in order
    pub fn filter<'a>(&self, items: &'a [T]) -> Vec<&'a T> {
        items.iter().filter(|item| self.evaluate(item)).collect()
    }
}

impl<T> Predicate<T> {
    /// True if both handles point at the same compiled function
    pub fn ptr_eq(&self, other: &Predicate<T>) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn even() -> Predicate<i32> {
        Predicate::new(|n: &i32| n % 2 == 0)
    }

    fn positive() -> Predicate<i32> {
        Predicate::new(|n: &i32| *n > 0)
    }

    #[test]
    fn test_combinators() {
        assert!(even().and(positive()).evaluate(&4));
        assert!(!even().and(positive()).evaluate(&-4));
        assert!(even().or(positive()).evaluate(&3));
        assert!(even().and_not(positive()).evaluate(&-2));
        assert!(even().or_not(positive()).evaluate(&-3));
        assert!(even().not().evaluate(&3));
    }

    #[test]
    fn test_combine_matches_named_methods() {
        for n in -3..=3 {
            assert_eq!(
                even().combine(Concat::OrNot, positive()).evaluate(&n),
                even().or_not(positive()).evaluate(&n)
            );
        }
    }

    #[test]
    fn test_filter_and_identity() {
        let items = [1, 2, 3, 4];
        let p = even();
        assert_eq!(p.filter(&items), vec![&2, &4]);

        let q = p.clone();
        assert!(p.ptr_eq(&q));
        assert!(!p.ptr_eq(&even()));
        assert!(Predicate::<i32>::always().evaluate(&7));
    }
}
