//! Reference-counted views over exclusively owned engine objects.
//!
//! Every engine object is deleted by exactly one party: either the single
//! [`View`] that oversees it, or the engine object that owns it in the
//! engine's own graph (a parent node, a frame renderer). A view records which
//! of the two applies in its [`Ownership`] state:
//!
//! - `Unowned`: the view deletes its object when the last `Rc` goes away.
//! - `OwnedBy(owner)`: deletion is suppressed; the view keeps the owner's view
//!   alive so the owner cannot be deleted underneath it.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::BindingError;

/// Ownership state of a view's engine object.
pub enum Ownership<O: ?Sized> {
    Unowned,
    OwnedBy(Rc<O>),
}

impl<O: ?Sized> Ownership<O> {
    pub fn is_owned(&self) -> bool {
        matches!(self, Ownership::OwnedBy(_))
    }

    pub fn owner(&self) -> Option<&Rc<O>> {
        match self {
            Ownership::Unowned => None,
            Ownership::OwnedBy(owner) => Some(owner),
        }
    }

    /// Resets to `Unowned`, returning the previous owner.
    pub fn take(&mut self) -> Option<Rc<O>> {
        match std::mem::take(self) {
            Ownership::Unowned => None,
            Ownership::OwnedBy(owner) => Some(owner),
        }
    }
}

impl<O: ?Sized> Default for Ownership<O> {
    fn default() -> Self {
        Ownership::Unowned
    }
}

impl<O: ?Sized> Clone for Ownership<O> {
    fn clone(&self) -> Self {
        match self {
            Ownership::Unowned => Ownership::Unowned,
            Ownership::OwnedBy(owner) => Ownership::OwnedBy(Rc::clone(owner)),
        }
    }
}

impl<O: ?Sized> fmt::Debug for Ownership<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ownership::Unowned => f.write_str("Unowned"),
            Ownership::OwnedBy(owner) => write!(f, "OwnedBy({:p})", Rc::as_ptr(owner)),
        }
    }
}

/// An engine object handle that a [`View`] can oversee.
pub trait Managed {
    /// Type of the view (or aggregate) that can own this object.
    type Owner: ?Sized;

    /// Object kind used in ownership error messages.
    const KIND: &'static str;
    /// Owner kind used in ownership error messages.
    const OWNER_KIND: &'static str;

    /// Deletes the engine object. Called at most once, only while unowned.
    fn delete(&self);

    /// Called on destruction before the ownership check, with the owner if
    /// there is one. Containers move their locks to the owner here.
    fn retire(&self, _owner: Option<&Rc<Self::Owner>>) {}
}

/// Reference-counted wrapper that bridges one engine object into shared
/// ownership.
pub struct View<T: Managed> {
    object: T,
    owned_by: RefCell<Ownership<T::Owner>>,
}

impl<T: Managed> View<T> {
    /// Wraps a freshly created, unowned engine object.
    pub fn new(object: T) -> Rc<Self> {
        Rc::new(Self {
            object,
            owned_by: RefCell::new(Ownership::Unowned),
        })
    }

    pub fn object(&self) -> &T {
        &self.object
    }

    pub fn ownership(&self) -> Ownership<T::Owner> {
        self.owned_by.borrow().clone()
    }

    pub fn owner(&self) -> Option<Rc<T::Owner>> {
        self.owned_by.borrow().owner().cloned()
    }

    pub fn is_owned(&self) -> bool {
        self.owned_by.borrow().is_owned()
    }

    /// Fails with `AlreadyOwned` if another object owns this one.
    pub fn ensure_unowned(&self) -> Result<(), BindingError> {
        if self.is_owned() {
            return Err(BindingError::AlreadyOwned {
                object: T::KIND,
                owner: T::OWNER_KIND,
            });
        }
        Ok(())
    }

    /// Hands the engine object over to `owner`.
    ///
    /// `attach` performs the engine-level operation. The ownership state only
    /// changes when it succeeds, so a failed attach leaves both sides as they
    /// were.
    pub fn adopt(
        &self,
        owner: &Rc<T::Owner>,
        attach: impl FnOnce() -> Result<(), BindingError>,
    ) -> Result<(), BindingError> {
        self.ensure_unowned()?;
        attach()?;
        *self.owned_by.borrow_mut() = Ownership::OwnedBy(Rc::clone(owner));
        Ok(())
    }

    /// Takes the engine object back from its owner, if any.
    ///
    /// `detach` performs the engine-level operation first; the view becomes
    /// responsible for deletion again once it succeeded.
    pub fn release(&self, detach: impl FnOnce() -> Result<(), BindingError>) -> Result<(), BindingError> {
        detach()?;
        let previous = self.owned_by.borrow_mut().take();
        // the previous owner may be the last reference to its view
        drop(previous);
        Ok(())
    }
}

impl<T: Managed> Drop for View<T> {
    fn drop(&mut self) {
        let owner = self.owned_by.get_mut().take();
        self.object.retire(owner.as_ref());
        if owner.is_none() {
            self.object.delete();
        }
    }
}

impl<T: Managed + fmt::Debug> fmt::Debug for View<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("object", &self.object)
            .field("owned_by", &*self.owned_by.borrow())
            .finish()
    }
}

/// Set of opaque resources a container keeps alive, compared by identity.
#[derive(Clone, Default)]
pub struct Locks {
    items: Vec<Rc<dyn Any>>,
}

impl Locks {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, lock: &Rc<dyn Any>) -> Option<usize> {
        let target = Rc::as_ptr(lock) as *const ();
        self.items
            .iter()
            .position(|item| Rc::as_ptr(item) as *const () == target)
    }

    /// Adds `lock` unless the same object is already held.
    pub fn insert(&mut self, lock: Rc<dyn Any>) -> bool {
        if self.position(&lock).is_some() {
            return false;
        }
        self.items.push(lock);
        true
    }

    pub fn contains(&self, lock: &Rc<dyn Any>) -> bool {
        self.position(lock).is_some()
    }

    /// Moves every lock of `other` into `self`.
    pub fn absorb(&mut self, other: Locks) {
        for lock in other.items {
            self.insert(lock);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl fmt::Debug for Locks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locks").field("len", &self.items.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counted {
        deleted: Rc<Cell<u32>>,
    }

    impl Managed for Counted {
        type Owner = String;
        const KIND: &'static str = "counted object";
        const OWNER_KIND: &'static str = "owner";

        fn delete(&self) {
            self.deleted.set(self.deleted.get() + 1);
        }
    }

    fn counted() -> (Rc<View<Counted>>, Rc<Cell<u32>>) {
        let deleted = Rc::new(Cell::new(0));
        let view = View::new(Counted {
            deleted: Rc::clone(&deleted),
        });
        (view, deleted)
    }

    #[test]
    fn unowned_view_deletes_exactly_once() {
        let (view, deleted) = counted();
        let second = Rc::clone(&view);
        drop(view);
        assert_eq!(deleted.get(), 0, "still referenced");
        drop(second);
        assert_eq!(deleted.get(), 1);
    }

    #[test]
    fn owned_view_does_not_delete() {
        let (view, deleted) = counted();
        let owner = Rc::new(String::from("parent"));
        view.adopt(&owner, || Ok(())).unwrap();
        drop(view);
        assert_eq!(deleted.get(), 0);
    }

    #[test]
    fn adopt_twice_fails_with_already_owned() {
        let (view, _) = counted();
        let owner = Rc::new(String::new());
        view.adopt(&owner, || Ok(())).unwrap();
        let err = view.adopt(&owner, || Ok(())).unwrap_err();
        assert!(matches!(
            err,
            BindingError::AlreadyOwned {
                object: "counted object",
                owner: "owner"
            }
        ));
    }

    #[test]
    fn failed_attach_keeps_view_unowned() {
        let (view, _) = counted();
        let owner = Rc::new(String::new());
        let result = view.adopt(&owner, || Err(BindingError::CircularRelation));
        assert!(result.is_err());
        assert!(!view.is_owned());
        assert_eq!(Rc::strong_count(&owner), 1);
    }

    #[test]
    fn release_restores_deletion_duty() {
        let (view, deleted) = counted();
        let owner = Rc::new(String::new());
        view.adopt(&owner, || Ok(())).unwrap();
        view.release(|| Ok(())).unwrap();
        view.release(|| Ok(())).unwrap();
        assert!(!view.is_owned());
        assert_eq!(Rc::strong_count(&owner), 1);
        drop(view);
        assert_eq!(deleted.get(), 1);
    }

    #[test]
    fn owned_view_keeps_owner_alive() {
        let (view, _) = counted();
        let owner = Rc::new(String::new());
        view.adopt(&owner, || Ok(())).unwrap();
        assert_eq!(Rc::strong_count(&owner), 2);
        drop(view);
        assert_eq!(Rc::strong_count(&owner), 1);
    }

    #[test]
    fn locks_deduplicate_by_identity() {
        let mut locks = Locks::new();
        let a: Rc<dyn Any> = Rc::new(1_u8);
        let b: Rc<dyn Any> = Rc::new(1_u8);
        assert!(locks.insert(Rc::clone(&a)));
        assert!(!locks.insert(Rc::clone(&a)));
        assert!(locks.insert(Rc::clone(&b)));
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn absorb_merges_without_duplicates() {
        let shared: Rc<dyn Any> = Rc::new("segment");
        let mut parent = Locks::new();
        parent.insert(Rc::clone(&shared));
        let mut child = Locks::new();
        child.insert(Rc::clone(&shared));
        child.insert(Rc::new(3_i32));
        parent.absorb(child);
        assert_eq!(parent.len(), 2);
        assert!(parent.contains(&shared));
    }

    #[test]
    fn ownership_debug_is_readable() {
        let unowned: Ownership<String> = Ownership::Unowned;
        assert_eq!(format!("{unowned:?}"), "Unowned");
        let owned = Ownership::OwnedBy(Rc::new(String::new()));
        assert!(format!("{owned:?}").starts_with("OwnedBy("));
    }
}
