use std::borrow::Borrow;
use std::collections::hash_map::{self, Entry};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::iter::{self, FromIterator, FusedIterator};

use itertools::RepeatN;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
pub enum BagError {
    /// Negative count, or a removal of more copies than the bag holds.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(isize),
}

/// A multiset: every distinct element is stored once along with how many
/// copies of it are present. Quantities are always positive; an element whose
/// quantity drops to zero is dropped from the map.
#[derive(Clone, Eq, PartialEq)]
pub struct Bag<T: Eq + Hash> {
    map: HashMap<T, usize>,
    size: usize,
}

impl<T: Eq + Hash> Bag<T> {
    pub fn new() -> Self {
        Bag {
            map: HashMap::new(),
            size: 0,
        }
    }

    pub fn add(&mut self, element: T, count: isize) -> Result<(), BagError> {
        if count < 0 {
            return Err(BagError::InvalidQuantity(count));
        }
        if count == 0 {
            return Ok(());
        }
        self.insert(element, count as usize).ok_or(BagError::InvalidQuantity(count))
    }

    /// Adds `count` copies, or returns `None` without touching the bag if
    /// either the element's quantity or the size would overflow.
    fn insert(&mut self, element: T, count: usize) -> Option<()> {
        let size = self.size.checked_add(count)?;
        match self.map.entry(element) {
            Entry::Occupied(mut entry) => {
                let quantity = entry.get().checked_add(count)?;
                *entry.get_mut() = quantity;
            }
            Entry::Vacant(entry) => { entry.insert(count); }
        }
        self.size = size;
        Some(())
    }

    pub fn remove<Q>(&mut self, element: &Q, count: isize) -> Result<(), BagError>
        where T: Borrow<Q>, Q: Eq + Hash + ?Sized {
        if count < 0 || count as usize > self.quantity(element) {
            return Err(BagError::InvalidQuantity(count));
        }
        if count == 0 {
            return Ok(());
        }
        let count = count as usize;
        // Present, since quantity() >= count > 0.
        if let Some(stored) = self.map.get_mut(element) {
            *stored -= count;
            if *stored == 0 {
                self.map.remove(element);
            }
        }
        self.size -= count;
        Ok(())
    }

    pub fn quantity<Q>(&self, element: &Q) -> usize
        where T: Borrow<Q>, Q: Eq + Hash + ?Sized {
        self.map.get(element).cloned().unwrap_or(0)
    }

    pub fn contains<Q>(&self, element: &Q) -> bool
        where T: Borrow<Q>, Q: Eq + Hash + ?Sized {
        self.map.contains_key(element)
    }

    /// Total number of elements, counting multiplicity.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn distinct_len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.size = 0;
    }

    pub fn distinct(&self) -> impl Iterator<Item=&T> {
        self.map.keys()
    }

    pub fn counts(&self) -> impl Iterator<Item=(&T, usize)> {
        self.map.iter().map(|(element, &count)| (element, count))
    }

    /// Each call starts a new traversal; copies of an element are yielded
    /// back to back, distinct elements in unspecified order.
    pub fn iter(&self) -> Iter<T> {
        Iter {
            entries: self.map.iter(),
            current: None,
            remaining: self.size,
        }
    }
}

impl<T: Eq + Hash + Clone> Bag<T> {
    /// The distinct elements, copied out of the bag.
    pub fn to_set(&self) -> HashSet<T> {
        self.map.keys().cloned().collect()
    }
}

impl<T: Eq + Hash> Default for Bag<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + fmt::Debug> fmt::Debug for Bag<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.map.iter()).finish()
    }
}

pub struct Iter<'a, T: 'a> {
    entries: hash_map::Iter<'a, T, usize>,
    current: Option<(&'a T, usize)>,
    remaining: usize,
}

impl<'a, T: 'a> Iterator for Iter<'a, T> {
    type Item = &'a T;
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((element, left)) = &mut self.current {
                if *left > 0 {
                    *left -= 1;
                    self.remaining -= 1;
                    return Some(*element);
                }
            }
            let (element, &count) = self.entries.next()?;
            self.current = Some((element, count));
        }
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T: 'a> ExactSizeIterator for Iter<'a, T> {}

impl<'a, T: 'a> FusedIterator for Iter<'a, T> {}

impl<'a, T: Eq + Hash> IntoIterator for &'a Bag<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub type IntoIter<T> = iter::FlatMap<hash_map::IntoIter<T, usize>, RepeatN<T>, fn((T, usize)) -> RepeatN<T>>;

impl<T: Eq + Hash + Clone> IntoIterator for Bag<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;
    fn into_iter(self) -> Self::IntoIter {
        let expand: fn((T, usize)) -> RepeatN<T> = |(element, count)| itertools::repeat_n(element, count);
        self.map.into_iter().flat_map(expand)
    }
}

impl<T: Eq + Hash> Extend<T> for Bag<T> {
    fn extend<I: IntoIterator<Item=T>>(&mut self, iter: I) {
        for element in iter {
            if self.insert(element, 1).is_none() {
                panic!("bag size overflow");
            }
        }
    }
}

impl<T: Eq + Hash> FromIterator<T> for Bag<T> {
    fn from_iter<I: IntoIterator<Item=T>>(iter: I) -> Self {
        let mut result = Bag::new();
        result.extend(iter);
        result
    }
}

#[cfg(test)]
fn sorted<T: Ord + Clone + Eq + Hash>(bag: &Bag<T>) -> Vec<T> {
    use itertools::Itertools;
    bag.iter().cloned().sorted().collect()
}

#[test]
fn test_single_element_type() {
    let mut bag = Bag::new();
    bag.add("c", 3).unwrap();
    bag.add("c", 6).unwrap();
    assert_eq!(bag.quantity("c"), 9);
}

#[test]
fn test_multiple_element_types() {
    let mut bag = Bag::new();
    bag.add("a", 5).unwrap();
    bag.add("b", 3).unwrap();
    bag.add("a", 6).unwrap();
    bag.add("b", 2).unwrap();
    assert_eq!(bag.quantity("b"), 5);
    assert_eq!(bag.quantity("a"), 11);
}

#[test]
fn test_remove() {
    let mut bag = Bag::new();
    bag.add("x", 17).unwrap();
    bag.add("y", 3).unwrap();
    bag.remove("x", 1).unwrap();
    bag.add("x", 6).unwrap();
    bag.remove("x", 2).unwrap();
    assert_eq!(bag.quantity("x"), 20);
    assert_eq!(bag.size(), 23);
}

#[test]
fn test_multiple_bags() {
    let mut strings = Bag::<String>::new();
    let mut ints = Bag::<i32>::new();
    ints.add(86, 5).unwrap();
    strings.add("m".to_string(), 12).unwrap();
    strings.remove("m", 3).unwrap();
    ints.add(86, 8).unwrap();
    ints.add(99, 5).unwrap();
    ints.add(99, 5).unwrap();
    assert_eq!(strings.quantity("m"), 9);
    assert_eq!(ints.quantity(&86), 13);
    assert_eq!(ints.quantity(&99), 10);
}

#[test]
fn test_size() {
    let mut bag = Bag::new();
    bag.add("j", 33).unwrap();
    bag.add("k", 1).unwrap();
    bag.remove("j", 10).unwrap();
    bag.add("i", 6).unwrap();
    bag.remove("i", 2).unwrap();
    bag.add("k", 6).unwrap();
    assert_eq!(bag.size(), bag.quantity("i") + bag.quantity("j") + bag.quantity("k"));
    assert_eq!(bag.size(), 34);
}

#[test]
fn test_remove_all() {
    let mut bag = Bag::new();
    bag.add("u", 6).unwrap();
    bag.add("v", 4).unwrap();
    bag.add("u", 2).unwrap();
    bag.remove("u", 8).unwrap();
    assert_eq!(bag.quantity("u"), 0);
    assert!(!bag.contains("u"));
    let set = bag.to_set();
    assert!(!set.contains("u"));
    assert!(set.contains("v"));
    assert_eq!(bag.distinct_len(), 1);
}

#[test]
fn test_nonexistent() {
    let mut bag = Bag::new();
    bag.add("f", 3).unwrap();
    bag.add("g", 2).unwrap();
    assert_eq!(bag.quantity("h"), 0);
    assert_eq!(Bag::<&str>::new().quantity("h"), 0);
}

#[test]
fn test_zero() {
    let mut bag = Bag::new();
    bag.add("p", 5).unwrap();
    bag.add("p", 0).unwrap();
    assert_eq!(bag.quantity("p"), 5);
    bag.remove("p", 0).unwrap();
    assert_eq!(bag.quantity("p"), 5);
    bag.add("absent", 0).unwrap();
    bag.remove("absent", 0).unwrap();
    assert!(!bag.contains("absent"));
    assert_eq!(bag.distinct_len(), 1);
}

#[test]
fn test_distinct() {
    let mut bag = Bag::new();
    bag.add("t", 33).unwrap();
    bag.add("s", 4).unwrap();
    bag.add("t", 6).unwrap();
    let set = bag.to_set();
    assert_eq!(set.len(), 2);
    assert!(set.contains("s"));
    assert!(set.contains("t"));
}

#[test]
fn test_to_set_is_a_copy() {
    let mut bag = Bag::new();
    bag.add("t", 1).unwrap();
    let mut set = bag.to_set();
    set.insert("w");
    bag.remove("t", 1).unwrap();
    assert!(set.contains("t"));
    assert!(bag.to_set().is_empty());
}

#[test]
fn test_iter() {
    let mut bag = Bag::new();
    bag.add("r", 1).unwrap();
    bag.add("q", 3).unwrap();
    bag.add("r", 2).unwrap();
    bag.add("q", 1).unwrap();
    bag.add("p", 1).unwrap();
    assert_eq!(sorted(&bag), vec!["p", "q", "q", "q", "q", "r", "r", "r"]);
    assert_eq!(bag.iter().len(), 8);
    // A second traversal starts from scratch.
    assert_eq!(bag.iter().count(), 8);
    assert_eq!((&bag).into_iter().count(), 8);
    let mut owned: Vec<&str> = bag.into_iter().collect();
    owned.sort();
    assert_eq!(owned, vec!["p", "q", "q", "q", "q", "r", "r", "r"]);
}

#[test]
fn test_iter_contiguous() {
    use itertools::Itertools;
    let mut bag = Bag::new();
    bag.add(1, 3).unwrap();
    bag.add(2, 2).unwrap();
    bag.add(3, 4).unwrap();
    let produced: Vec<i32> = bag.iter().cloned().collect();
    let runs: Vec<i32> = produced.iter().cloned().dedup().collect();
    assert_eq!(runs.len(), 3);
}

#[test]
fn test_iter_empty() {
    let bag = Bag::<u8>::new();
    let mut iter = bag.iter();
    assert_eq!(iter.size_hint(), (0, Some(0)));
    assert_eq!(iter.next(), None);
    assert_eq!(iter.next(), None);
}

#[test]
fn test_remove_too_many() {
    let mut bag = Bag::new();
    bag.add("e", 34).unwrap();
    assert_eq!(bag.remove("e", 35), Err(BagError::InvalidQuantity(35)));
    assert_eq!(bag.quantity("e"), 34);
    assert_eq!(bag.remove("never", 1), Err(BagError::InvalidQuantity(1)));
    assert_eq!(bag.size(), 34);
}

#[test]
fn test_remove_negative() {
    let mut bag = Bag::new();
    bag.add("e", 12).unwrap();
    assert_eq!(bag.remove("e", -2), Err(BagError::InvalidQuantity(-2)));
    assert_eq!(bag.quantity("e"), 12);
}

#[test]
fn test_add_negative() {
    let mut bag = Bag::new();
    assert_eq!(bag.add("e", -2), Err(BagError::InvalidQuantity(-2)));
    assert_eq!(bag.quantity("e"), 0);
    assert!(bag.is_empty());
    assert_eq!(bag, Bag::new());
}

#[test]
fn test_add_overflow() {
    let mut bag = Bag::new();
    bag.add("a", isize::MAX).unwrap();
    bag.add("b", isize::MAX).unwrap();
    let before = bag.clone();
    // Size would pass usize::MAX.
    assert_eq!(bag.add("c", 2), Err(BagError::InvalidQuantity(2)));
    assert_eq!(bag.quantity("c"), 0);
    assert_eq!(bag, before);
    assert_eq!(bag.size(), bag.quantity("a") + bag.quantity("b"));

    let mut bag = Bag::new();
    bag.add("a", isize::MAX).unwrap();
    bag.add("a", isize::MAX).unwrap();
    bag.add("a", 1).unwrap();
    assert_eq!(bag.quantity("a"), usize::MAX);
    // Quantity of "a" would overflow.
    assert_eq!(bag.add("a", 1), Err(BagError::InvalidQuantity(1)));
    assert_eq!(bag.quantity("a"), usize::MAX);
    assert_eq!(bag.size(), usize::MAX);
}

#[test]
#[should_panic(expected = "bag size overflow")]
fn test_extend_overflow() {
    let mut bag = Bag::new();
    bag.add('x', isize::MAX).unwrap();
    bag.add('x', isize::MAX).unwrap();
    bag.add('x', 1).unwrap();
    bag.extend(Some('y'));
}

#[test]
fn test_from_iter() {
    let bag: Bag<char> = "mississippi".chars().collect();
    assert_eq!(bag.quantity(&'s'), 4);
    assert_eq!(bag.quantity(&'i'), 4);
    assert_eq!(bag.quantity(&'p'), 2);
    assert_eq!(bag.quantity(&'m'), 1);
    assert_eq!(bag.size(), 11);
    let mut expected = Bag::new();
    expected.add('m', 1).unwrap();
    expected.add('i', 4).unwrap();
    expected.add('s', 4).unwrap();
    expected.add('p', 2).unwrap();
    assert_eq!(bag, expected);
}

#[test]
fn test_counts() {
    use itertools::Itertools;
    let bag: Bag<&str> = vec!["b", "a", "b", "c", "b"].into_iter().collect();
    let counts: Vec<(&str, usize)> = bag.counts().map(|(&e, n)| (e, n)).sorted().collect();
    assert_eq!(counts, vec![("a", 1), ("b", 3), ("c", 1)]);
    assert_eq!(bag.distinct().count(), 3);
    assert!(bag.contains("c"));
    assert!(!bag.contains("d"));
}

#[test]
fn test_clear() {
    let mut bag: Bag<u32> = vec![1, 1, 2].into_iter().collect();
    bag.clear();
    assert!(bag.is_empty());
    assert_eq!(bag.quantity(&1), 0);
    assert_eq!(bag.iter().count(), 0);
}

#[test]
fn test_random_against_model() {
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;
    let mut rng = StdRng::seed_from_u64(0x6261_67);
    let mut bag = Bag::new();
    let mut model = [0isize; 8];
    for _ in 0..2000 {
        let element = rng.gen_range(0..model.len());
        let count = rng.gen_range(-2..6);
        if rng.gen_bool(0.5) {
            let result = bag.add(element, count);
            assert_eq!(result.is_ok(), count >= 0);
            if count >= 0 { model[element] += count; }
        } else {
            let result = bag.remove(&element, count);
            let valid = count >= 0 && count <= model[element];
            assert_eq!(result.is_ok(), valid);
            if valid { model[element] -= count; }
        }
        assert_eq!(bag.quantity(&element) as isize, model[element]);
        assert_eq!(bag.size() as isize, model.iter().sum::<isize>());
        assert_eq!(bag.distinct_len(), model.iter().filter(|&&x| x > 0).count());
    }
}

#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    fn ops() -> impl Strategy<Value=Vec<(bool, u8, isize)>> {
        proptest::collection::vec((any::<bool>(), 0u8..6, -3isize..10), 0..64)
    }

    fn replay(ops: &[(bool, u8, isize)]) -> Bag<u8> {
        let mut bag = Bag::new();
        for &(adding, element, count) in ops {
            let _ = if adding { bag.add(element, count) } else { bag.remove(&element, count) };
        }
        bag
    }

    proptest! {
        #[test]
        fn prop_additive(e in any::<u8>(), c1 in 0isize..1000, c2 in 0isize..1000) {
            let mut bag = Bag::new();
            bag.add(e, c1).unwrap();
            bag.add(e, c2).unwrap();
            prop_assert_eq!(bag.quantity(&e), (c1 + c2) as usize);
        }

        #[test]
        fn prop_full_removal(e in any::<u8>(), c in 0isize..1000) {
            let mut bag = Bag::new();
            bag.add(e, c).unwrap();
            bag.remove(&e, c).unwrap();
            prop_assert_eq!(bag.quantity(&e), 0);
            prop_assert!(!bag.to_set().contains(&e));
        }

        #[test]
        fn prop_size_is_sum_of_quantities(ops in ops()) {
            let bag = replay(&ops);
            let sum: usize = bag.to_set().iter().map(|e| bag.quantity(e)).sum();
            prop_assert_eq!(bag.size(), sum);
        }

        #[test]
        fn prop_failures_leave_bag_unchanged(ops in ops(), e in 0u8..6, extra in 1isize..5) {
            let mut bag = replay(&ops);
            let before = bag.clone();
            prop_assert!(bag.add(e, -extra).is_err());
            prop_assert!(bag.remove(&e, -extra).is_err());
            let too_many = bag.quantity(&e) as isize + extra;
            prop_assert_eq!(bag.remove(&e, too_many), Err(BagError::InvalidQuantity(too_many)));
            prop_assert_eq!(bag, before);
        }

        #[test]
        fn prop_zero_is_noop(ops in ops(), e in any::<u8>()) {
            let mut bag = replay(&ops);
            let before = bag.clone();
            bag.add(e, 0).unwrap();
            bag.remove(&e, 0).unwrap();
            prop_assert_eq!(bag, before);
        }

        #[test]
        fn prop_iter_multiplicity(ops in ops()) {
            let bag = replay(&ops);
            let produced: Vec<u8> = bag.iter().cloned().collect();
            prop_assert_eq!(produced.len(), bag.size());
            for e in bag.distinct() {
                prop_assert_eq!(produced.iter().filter(|&x| x == e).count(), bag.quantity(e));
            }
            let rebuilt: Bag<u8> = produced.into_iter().collect();
            prop_assert_eq!(rebuilt, bag);
        }
    }
}
