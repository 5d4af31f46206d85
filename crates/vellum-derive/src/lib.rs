//! Derive macro for vellum entities.
//!
//! This crate provides `#[derive(Entity)]`, which maps a struct with named
//! fields to a table.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Expr, Fields, Ident, Lit, Meta, Type};

/// Derives `vellum_core::entity::Entity` for a struct.
///
/// # Attributes
///
/// - `#[entity(table = "name")]` - SQL table name (optional, defaults to the
///   `snake_case` struct name)
/// - `#[entity(schema = "name")]` - schema, when not the vendor default
///
/// # Field Attributes
///
/// - `#[column(name = "column_name")]` - SQL column name (defaults to the field name)
/// - `#[column(primary_key)]` - part of the primary key
/// - `#[column(identity)]` - database-generated
/// - `#[column(unique)]` - backed by a unique index
/// - `#[column(nullable)]` - accepts NULL (implied by `Option<T>` fields)
/// - `#[column(size = 200)]` - maximum length
/// - `#[column(default = "expr")]` - raw SQL default expression
/// - `#[column(references = "table.column")]` - foreign key
/// - `#[column(renamed_from = "old_name")]` - former column name
///
/// # Generated Items
///
/// - `impl Entity for T` with the table name, column metadata, and
///   record conversions
/// - one `Field` accessor per column, named after the field
#[proc_macro_derive(Entity, attributes(entity, column))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_entity_impl(&input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn derive_entity_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let entity = parse_entity_attrs(&input.attrs, struct_name)?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Entity derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Entity derive only supports structs",
            ));
        }
    };

    let mut columns: Vec<ColumnInfo> = Vec::new();
    for field in fields {
        let Some(field_name) = field.ident.clone() else {
            return Err(syn::Error::new_spanned(field, "expected a named field"));
        };
        let attrs = parse_column_attrs(&field.attrs)?;
        columns.push(ColumnInfo {
            column_name: attrs.name.clone().unwrap_or_else(|| field_name.to_string()),
            nullable: attrs.nullable || is_option(&field.ty),
            field_name,
            field_type: field.ty.clone(),
            attrs,
        });
    }

    let schema_entries = columns.iter().map(|info| {
        let name = &info.column_name;
        let field_type = &info.field_type;
        let rust_type = quote!(#field_type).to_string().replace(' ', "");
        let nullable = info.nullable;
        let primary_key = info.attrs.primary_key;
        let unique = info.attrs.unique;
        let identity = info.attrs.identity;
        let default_expr = optional_str(info.attrs.default_expr.as_deref());
        let size = match info.attrs.size {
            Some(size) => quote! { Some(#size) },
            None => quote! { None },
        };
        let references = match &info.attrs.references {
            Some((table, column)) => quote! { Some((#table, #column)) },
            None => quote! { None },
        };
        let renamed_from = optional_str(info.attrs.renamed_from.as_deref());
        quote! {
            ::vellum_core::entity::ColumnSchema {
                name: #name,
                rust_type: #rust_type,
                nullable: #nullable,
                primary_key: #primary_key,
                unique: #unique,
                identity: #identity,
                default_expr: #default_expr,
                size: #size,
                references: #references,
                renamed_from: #renamed_from,
            }
        }
    });

    let from_record = columns.iter().map(|info| {
        let field_name = &info.field_name;
        let column_name = &info.column_name;
        quote! { #field_name: record.get(#column_name)? }
    });

    let to_values = columns.iter().map(|info| {
        let field_name = &info.field_name;
        let column_name = &info.column_name;
        quote! {
            (#column_name, ::vellum_core::value::ToSqlValue::to_sql_value(
                ::core::clone::Clone::clone(&self.#field_name),
            ))
        }
    });

    let accessors = columns.iter().map(|info| {
        let field_name = &info.field_name;
        let field_type = &info.field_type;
        let column_name = &info.column_name;
        quote! {
            /// Typed accessor for the column.
            #[inline]
            #[must_use]
            pub const fn #field_name() -> ::vellum_core::entity::Field<Self, #field_type> {
                ::vellum_core::entity::Field::new(#column_name)
            }
        }
    });

    let table_name = &entity.table;
    let schema = optional_str(entity.schema.as_deref());

    Ok(quote! {
        impl ::vellum_core::entity::Entity for #struct_name {
            const TABLE: &'static str = #table_name;
            const SCHEMA: ::core::option::Option<&'static str> = #schema;
            const COLUMNS: &'static [::vellum_core::entity::ColumnSchema] = &[
                #(#schema_entries),*
            ];

            fn from_record(
                record: &::vellum_core::query::Record,
            ) -> ::core::result::Result<Self, ::vellum_core::ResultError> {
                ::core::result::Result::Ok(Self {
                    #(#from_record),*
                })
            }

            fn to_values(&self) -> ::std::vec::Vec<(&'static str, ::vellum_core::Value)> {
                ::std::vec![#(#to_values),*]
            }
        }

        impl #struct_name {
            #(#accessors)*
        }
    })
}

fn optional_str(value: Option<&str>) -> TokenStream2 {
    match value {
        Some(v) => quote! { ::core::option::Option::Some(#v) },
        None => quote! { ::core::option::Option::None },
    }
}

fn is_option(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|s| s.ident == "Option"),
        _ => false,
    }
}

struct EntityAttrs {
    table: String,
    schema: Option<String>,
}

struct ColumnInfo {
    field_name: Ident,
    field_type: Type,
    column_name: String,
    nullable: bool,
    attrs: ColumnAttrs,
}

#[derive(Default)]
struct ColumnAttrs {
    name: Option<String>,
    primary_key: bool,
    identity: bool,
    unique: bool,
    nullable: bool,
    size: Option<u32>,
    default_expr: Option<String>,
    references: Option<(String, String)>,
    renamed_from: Option<String>,
}

fn string_value(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<String> {
    let value: Expr = meta.value()?.parse()?;
    match value {
        Expr::Lit(syn::ExprLit {
            lit: Lit::Str(s), ..
        }) => Ok(s.value()),
        other => Err(syn::Error::new_spanned(other, "expected a string literal")),
    }
}

fn parse_entity_attrs(attrs: &[Attribute], struct_name: &Ident) -> syn::Result<EntityAttrs> {
    let mut result = EntityAttrs {
        table: to_snake_case(&struct_name.to_string()),
        schema: None,
    };
    for attr in attrs.iter().filter(|a| a.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                result.table = string_value(&meta)?;
            } else if meta.path.is_ident("schema") {
                result.schema = Some(string_value(&meta)?);
            } else {
                return Err(meta.error("unknown entity attribute"));
            }
            Ok(())
        })?;
    }
    Ok(result)
}

fn parse_column_attrs(attrs: &[Attribute]) -> syn::Result<ColumnAttrs> {
    let mut result = ColumnAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("column") || matches!(attr.meta, Meta::Path(_)) {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("primary_key") {
                result.primary_key = true;
            } else if meta.path.is_ident("identity") {
                result.identity = true;
            } else if meta.path.is_ident("unique") {
                result.unique = true;
            } else if meta.path.is_ident("nullable") {
                result.nullable = true;
            } else if meta.path.is_ident("name") {
                result.name = Some(string_value(&meta)?);
            } else if meta.path.is_ident("default") {
                result.default_expr = Some(string_value(&meta)?);
            } else if meta.path.is_ident("renamed_from") {
                result.renamed_from = Some(string_value(&meta)?);
            } else if meta.path.is_ident("size") {
                let value: syn::LitInt = meta.value()?.parse()?;
                result.size = Some(value.base10_parse()?);
            } else if meta.path.is_ident("references") {
                let target = string_value(&meta)?;
                let Some((table, column)) = target.rsplit_once('.') else {
                    return Err(meta.error("references must be \"table.column\""));
                };
                result.references = Some((table.to_string(), column.to_string()));
            } else {
                return Err(meta.error("unknown column attribute"));
            }
            Ok(())
        })?;
    }

    Ok(result)
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}
