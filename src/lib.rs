#![doc = include_str!("../README.md")]

#[macro_use]
extern crate tracing;

pub(crate) const fn assert_sync<T: ?Sized + Sync>() {}
macro_rules! static_assert_sync {
  ($T:ty) => {
    const _: () = {
      let _ = $crate::assert_sync::<$T>;
    };
  };
}

pub(crate) const fn assert_send<T: ?Sized + Send>() {}
macro_rules! static_assert_send {
  ($T:ty) => {
    const _: () = {
      let _ = $crate::assert_send::<$T>;
    };
  };
}

pub mod client;
pub use client::{Client, Config, Credentials, Event, Events, RateLimits};

pub mod irc;
pub use irc::{Command, IrcMessage, TagValue};

pub mod common;
pub mod expect;
pub mod matcher;
pub mod ratelimit;
