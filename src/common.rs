//! Random types and utilties used by the library.

use std::cell::RefCell;
use std::fmt::{Debug, Display};

/// Lazily joins the items of an iterator with a separator when formatted.
///
/// Formatting consumes the iterator, so a `Join` can only be displayed once.
/// A second attempt returns [`std::fmt::Error`].
#[doc(hidden)]
pub struct Join<I, S>(RefCell<Option<I>>, S);

impl<I, S> Display for Join<I, S>
where
  I: Iterator,
  <I as Iterator>::Item: Display,
  S: Display,
{
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let Some(iter) = self.0.borrow_mut().take() else {
      return Err(std::fmt::Error);
    };

    let sep = &self.1;
    let mut peekable = iter.peekable();
    while let Some(item) = peekable.next() {
      write!(f, "{item}")?;
      if peekable.peek().is_some() {
        write!(f, "{sep}")?;
      }
    }
    Ok(())
  }
}

impl<I, S: Debug> Debug for Join<I, S> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("Join").field(&self.1).finish_non_exhaustive()
  }
}

#[doc(hidden)]
pub trait JoinIter: Sized {
  fn join<Sep>(self, sep: Sep) -> Join<Self, Sep>;
}

impl<Iter> JoinIter for Iter
where
  Iter: Sized + Iterator,
{
  fn join<Sep>(self, sep: Sep) -> Join<Self, Sep> {
    Join(RefCell::new(Some(self)), sep)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn join_with_separator() {
    assert_eq!(["#a", "#b", "#c"].iter().join(",").to_string(), "#a,#b,#c");
    assert_eq!(std::iter::empty::<&str>().join(",").to_string(), "");
    assert_eq!(["#a"].iter().join(", ").to_string(), "#a");
  }
}
