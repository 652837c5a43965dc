#![forbid(unsafe_code)]

mod pager;

pub use pager::{
    PageRead, Pager, PagerOptions, PagerStats, ReadGuard, WriteGuard, DEFAULT_PAGE_SIZE,
    MAX_PAGE_SIZE, MIN_PAGE_SIZE,
};
