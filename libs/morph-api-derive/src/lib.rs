use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, LitStr};

/// Derive macro mapping a struct with named fields onto records.
///
/// Generates `Typed`, `ToValue`, `FromValue` and `Model` for the annotated
/// struct. The generated `ModelDef` declares one schema entry per field, typed
/// by the field's Rust type.
///
/// # Example
///
/// ```ignore
/// #[derive(Model, Debug, PartialEq)]
/// #[model(name = "Daily", parent = "Journal", parent = "Tagged")]
/// pub struct Daily {
///     #[model(rename = "day")]
///     pub date: String,
///     pub entries: Vec<Entry>,
/// }
/// ```
///
/// Every field type must implement `Typed`, `ToValue` and `FromValue`.
#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match derive_impl(&input) {
        Ok(tokens) => tokens,
        Err(e) => e.to_compile_error().into(),
    }
}

fn derive_impl(input: &DeriveInput) -> Result<TokenStream, syn::Error> {
    let ident = &input.ident;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    ident,
                    "Model only supports structs with named fields",
                ))
            }
        },
        _ => return Err(syn::Error::new_spanned(ident, "Model only supports structs")),
    };

    // Parse #[model(...)] on the struct.
    let mut type_name = ident.to_string();
    let mut parents: Vec<String> = Vec::new();
    for attr in &input.attrs {
        if !attr.path().is_ident("model") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                type_name = value.value();
            } else if meta.path.is_ident("parent") {
                let value: LitStr = meta.value()?.parse()?;
                parents.push(value.value());
            } else {
                return Err(meta.error("unknown model attribute (expected 'name' or 'parent')"));
            }
            Ok(())
        })?;
    }

    let mut schema_tokens = Vec::new();
    let mut to_value_tokens = Vec::new();
    let mut from_value_tokens = Vec::new();

    for field in fields {
        let field_ident = field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected named field"))?;
        let field_ty = &field.ty;

        let mut field_name = field_ident.to_string();
        for attr in &field.attrs {
            if !attr.path().is_ident("model") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    let value: LitStr = meta.value()?.parse()?;
                    field_name = value.value();
                    Ok(())
                } else {
                    Err(meta.error("unknown field attribute (expected 'rename')"))
                }
            })?;
        }

        schema_tokens.push(quote! {
            .field(#field_name, <#field_ty as ::morph_api::model::Typed>::shape())
        });
        to_value_tokens.push(quote! {
            (#field_name, ::morph_api::model::ToValue::to_value(&self.#field_ident))
        });
        from_value_tokens.push(quote! {
            #field_ident: ::morph_api::model::read_field::<#field_ty>(&__record, #field_name)?
        });
    }

    let parent_tokens = parents.iter().map(|p| quote! { .parent(#p) });
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics ::morph_api::model::Typed for #ident #ty_generics #where_clause {
            fn shape() -> ::morph_api::schema::Shape {
                ::morph_api::schema::Shape::ty(#type_name)
            }
        }

        impl #impl_generics ::morph_api::model::ToValue for #ident #ty_generics #where_clause {
            fn to_value(&self) -> ::morph_api::value::Value {
                let __fields: ::std::vec::Vec<(&'static str, ::morph_api::value::Value)> = vec![
                    #(#to_value_tokens),*
                ];
                ::morph_api::value::Value::Record(
                    ::morph_api::value::Record::with_fields(#type_name, __fields),
                )
            }
        }

        impl #impl_generics ::morph_api::model::FromValue for #ident #ty_generics #where_clause {
            fn from_value(
                __value: ::morph_api::value::Value,
            ) -> ::morph_api::error::ConvertResult<Self> {
                let __record = ::morph_api::model::expect_record(&__value, #type_name)?;
                Ok(Self {
                    #(#from_value_tokens),*
                })
            }
        }

        impl #impl_generics ::morph_api::model::Model for #ident #ty_generics #where_clause {
            fn model_def() -> ::morph_api::model::ModelDef {
                ::morph_api::model::ModelDef::new(#type_name)
                    #(#parent_tokens)*
                    #(#schema_tokens)*
            }
        }
    };

    Ok(TokenStream::from(expanded))
}
