//! Procedural macros for the docscope project.
//!
//! `#[derive(Contract)]` turns a struct into a contract model the schema
//! inferencer reads at runtime; `#[derive(ContractEnum)]` lists the serialized
//! values of a unit-only enum so contract fields can declare it as an
//! enumeration.
//!
//! Generated code refers to `::docscope` by default. Crates depending on
//! `docscope-core` directly pass `#[contract(crate = "docscope_core")]`.

#[allow(unused_extern_crates)]
extern crate self as docscope_macros;

use proc_macro::TokenStream;

mod attr;
mod contract;
mod contract_enum;

#[proc_macro_derive(Contract, attributes(contract))]
pub fn derive_contract(input: TokenStream) -> TokenStream {
    contract::derive_contract(input.into()).into()
}

#[proc_macro_derive(ContractEnum, attributes(contract))]
pub fn derive_contract_enum(input: TokenStream) -> TokenStream {
    contract_enum::derive_contract_enum(input.into()).into()
}
