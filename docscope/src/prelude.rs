//! Convenient re-exports of commonly used types from docscope.
//!
//! ```ignore
//! use docscope::prelude::*;
//! ```
//!
//! This provides access to:
//! - The collection browser and its request types
//! - Store backends and builders
//! - Filter construction and find specs
//! - Pages, cursors and call contexts
//! - Schema reports, contracts and the registry
//! - Error types and configuration

pub use docscope_core::{
    backend::{DynStoreBackend, StoreBackend, StoreBackendBuilder},
    browser::{CollectionBrowser, ListRequest, SearchRequest},
    collection::Collection,
    config::BrowseConfig,
    context::{CallContext, CancelHandle, CancelToken},
    cursor::CursorCodec,
    error::{BrowseError, BrowseResult},
    normalize::{IdentifierNormalizer, normalize_filter},
    page::{CursorPage, OffsetPage, PageResult},
    pagination::{CursorRequest, OffsetRequest, PaginationEngine},
    query::{Filter, FindSpec, SortDirection},
    schema::{
        Contract, ContractEnum, ContractField, ContractModel, DeclaredType, FieldSchema,
        FieldType, InferRequest, SchemaInferencer, SchemaRegistry, SchemaReport, SchemaSource,
    },
};
pub use docscope_macros::{Contract, ContractEnum};
