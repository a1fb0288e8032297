#[cfg(all(feature = "sync", feature = "std"))]
pub(crate) use std::sync::Mutex;

#[cfg(all(feature = "sync", not(feature = "std")))]
pub(crate) use spin::Mutex;

#[cfg(feature = "sync")]
pub(crate) type Shared<T> = alloc::sync::Arc<Mutex<T>>;
#[cfg(not(feature = "sync"))]
pub(crate) type Shared<T> = alloc::rc::Rc<core::cell::RefCell<T>>;

pub(crate) fn shared<T>(t: T) -> Shared<T> {
    match () {
        #[cfg(feature = "sync")]
        () => alloc::sync::Arc::new(Mutex::new(t)),
        #[cfg(not(feature = "sync"))]
        () => alloc::rc::Rc::new(core::cell::RefCell::new(t)),
    }
}

pub(crate) fn same<T>(a: &Shared<T>, b: &Shared<T>) -> bool {
    match () {
        #[cfg(feature = "sync")]
        () => alloc::sync::Arc::ptr_eq(a, b),
        #[cfg(not(feature = "sync"))]
        () => alloc::rc::Rc::ptr_eq(a, b),
    }
}

macro_rules! acquire {
    ($shared: expr) => {
        match () {
            #[cfg(all(feature = "sync", feature = "std"))]
            () => $shared.lock().unwrap(),
            #[cfg(all(feature = "sync", not(feature = "std")))]
            () => $shared.lock(),
            #[cfg(not(feature = "sync"))]
            () => $shared.borrow_mut(),
        }
    };
}

pub(crate) use acquire;
