use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::super::bound::SeekBound;
use super::super::head::{
    BucketDeletionNotification, CatalogHead, HeadManager, NoopDeletionNotification,
};
use super::super::key::{IndexKey, KeyRef};
use super::super::ordering::{Direction, FieldOrder, KeyOrdering};
use super::super::page::{self, BucketMut, BucketRef, Footprint, OwnedEntry};
use super::super::stats::{BTreeStats, BTreeStatsSnapshot};
use crate::primitives::pager::{PageRead, Pager, WriteGuard};
use crate::types::{IndexError, PageId, RecordLoc, Result};

include!("types.rs");
include!("api.rs");
include!("navigate.rs");
include!("seek.rs");
include!("insert.rs");
include!("delete.rs");
include!("builder.rs");
include!("validate.rs");
include!("free.rs");
