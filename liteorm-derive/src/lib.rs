#![forbid(unsafe_code)]
use convert_case::{Case, Casing};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, spanned::Spanned, Attribute, Data, DataStruct, DeriveInput, Fields, Index,
    LitStr, Member,
};

#[proc_macro_derive(Entity, attributes(table_name, column_name, transient))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_entity(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[proc_macro_derive(Bind, attributes(column_name, transient))]
pub fn derive_bind(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_bind(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

////////////////////////////////////////////////////////////////////////////////

struct PersistedField<'a> {
    member: Member,
    attr_name: String,
    column_name: String,
    ty: &'a syn::Type,
}

fn expand_entity(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let data = plain_struct(input, "Entity")?;
    let type_name = &input.ident;
    let table_name = parse_table_name(input)?;
    let fields = persisted_fields(data)?;

    let mut field_entries = vec![];
    let mut value_of_arms = vec![];
    let mut assign_arms = vec![];
    let mut resolve_calls = vec![];
    for (i, field) in fields.iter().enumerate() {
        let PersistedField {
            member,
            attr_name,
            column_name,
            ty,
        } = field;

        field_entries.push(quote! {
            ::liteorm::Field {
                attr_name: #attr_name,
                column_name: #column_name,
                kind: <#ty as ::liteorm::FieldType>::KIND,
            },
        });
        value_of_arms.push(quote! {
            #i => ::std::option::Option::Some(::liteorm::FieldType::to_storage(&self.#member)),
        });
        assign_arms.push(quote! {
            #i => self.#member = <#ty as ::liteorm::FromValue>::from_value(value)?,
        });
        resolve_calls.push(quote! {
            ::liteorm::FieldType::resolve(&mut self.#member, session)?;
        });
    }

    Ok(quote! {
        impl ::liteorm::Entity for #type_name {
            fn schema() -> &'static ::liteorm::Schema {
                static SCHEMA: ::liteorm::Schema = ::liteorm::Schema {
                    type_name: concat!(module_path!(), "::", stringify!(#type_name)),
                    simple_name: ::std::stringify!(#type_name),
                    table_name: #table_name,

                    fields: &[#(#field_entries)*],
                };
                &SCHEMA
            }

            fn value_of(
                &self,
                index: usize,
            ) -> ::std::option::Option<::liteorm::CoerceResult<::liteorm::Value<'_>>> {
                match index {
                    #(#value_of_arms)*
                    _ => ::std::option::Option::None,
                }
            }

            #[allow(unused_variables)]
            fn assign(
                &mut self,
                index: usize,
                value: ::liteorm::Value<'_>,
            ) -> ::std::result::Result<(), ::liteorm::Mismatch> {
                match index {
                    #(#assign_arms)*
                    _ => {}
                }
                ::std::result::Result::Ok(())
            }

            #[allow(unused_variables)]
            fn resolve_links(&mut self, session: &::liteorm::Session) -> ::liteorm::Result<()> {
                #(#resolve_calls)*
                ::std::result::Result::Ok(())
            }
        }
    })
}

fn expand_bind(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let data = plain_struct(input, "Bind")?;
    let type_name = &input.ident;
    if let Fields::Unnamed(_) = data.fields {
        return Err(syn::Error::new(
            input.ident.span(),
            "`Bind` needs named fields to match column names against",
        ));
    }

    let fields = persisted_fields(data)?;
    let properties = fields.iter().map(|field| &field.column_name);
    let write_arms = fields.iter().enumerate().map(|(i, field)| {
        let member = &field.member;
        let ty = field.ty;
        quote! {
            #i => self.#member = <#ty as ::liteorm::Writable>::write_from(value)?,
        }
    });

    Ok(quote! {
        impl ::liteorm::Bind for #type_name {
            const PROPERTIES: &'static [&'static str] = &[#(#properties),*];

            #[allow(unused_variables)]
            fn write(
                &mut self,
                property: usize,
                value: ::liteorm::Value<'_>,
            ) -> ::std::result::Result<(), ::liteorm::Mismatch> {
                match property {
                    #(#write_arms)*
                    _ => {}
                }
                ::std::result::Result::Ok(())
            }
        }
    })
}

////////////////////////////////////////////////////////////////////////////////

fn plain_struct<'a>(input: &'a DeriveInput, derive: &str) -> syn::Result<&'a DataStruct> {
    let Data::Struct(ref data) = input.data else {
        return Err(syn::Error::new(
            input.ident.span(),
            format!("Only structs can derive `{}`", derive),
        ));
    };
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            format!("`{}` cannot be derived for generic structs", derive),
        ));
    }
    Ok(data)
}

/// Fields with a leading underscore or `#[transient]` are not persisted.
fn persisted_fields(data: &DataStruct) -> syn::Result<Vec<PersistedField<'_>>> {
    let mut res = vec![];
    for (i, field) in data.fields.iter().enumerate() {
        if is_transient(&field.attrs)? {
            continue;
        }
        let (member, attr_name) = match &field.ident {
            Some(ident) => {
                let name = ident.to_string();
                if name.starts_with('_') {
                    continue;
                }
                (Member::Named(ident.clone()), name)
            }
            None => (Member::Unnamed(Index::from(i)), i.to_string()),
        };

        let column_name = parse_column_name(field)?;
        if column_name == "_id" {
            return Err(syn::Error::new(
                field.span(),
                "`_id` is the synthetic row id column and cannot be declared",
            ));
        }

        res.push(PersistedField {
            member,
            attr_name,
            column_name,
            ty: &field.ty,
        });
    }
    Ok(res)
}

fn is_transient(attrs: &[Attribute]) -> syn::Result<bool> {
    for attr in attrs {
        if attr.path().is_ident("transient") {
            return match &attr.meta {
                syn::Meta::Path(_) => Ok(true),
                _ => Err(syn::Error::new(
                    attr.span(),
                    "`transient` takes no arguments. Usage: `#[transient]`",
                )),
            };
        }
    }
    Ok(false)
}

fn parse_name_attr(attrs: &[Attribute], name: &str) -> syn::Result<Option<String>> {
    for attr in attrs {
        if !attr.path().is_ident(name) {
            continue;
        }
        return match &attr.meta {
            syn::Meta::List(list) => match list.parse_args::<LitStr>() {
                Ok(lit) => Ok(Some(lit.value())),
                Err(_) => Err(syn::Error::new(
                    list.span(),
                    "Attribute argument should be a single string literal",
                )),
            },
            _ => Err(syn::Error::new(
                attr.span(),
                format!(
                    "Incorrect format for using `{0}` attribute. Usage: `#[{0}(\"Name\")]`",
                    name
                ),
            )),
        };
    }
    Ok(None)
}

fn parse_table_name(input: &DeriveInput) -> syn::Result<String> {
    Ok(parse_name_attr(&input.attrs, "table_name")?
        .unwrap_or_else(|| input.ident.to_string().to_case(Case::Snake)))
}

fn parse_column_name(field: &syn::Field) -> syn::Result<String> {
    let column_name = parse_name_attr(&field.attrs, "column_name")?
        .or_else(|| field.ident.as_ref().map(|ident| ident.to_string().to_case(Case::Snake)));

    match column_name {
        Some(name) => Ok(name),
        None => Err(syn::Error::new(
            field.span(),
            "Fields of tuple structs should be marked with `column_name` attribute",
        )),
    }
}
