use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitStr, Type, parse_macro_input, spanned::Spanned};

const BASE_COLUMNS: [&str; 5] = ["id", "token", "created_at", "updated_at", "is_active"];

#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_entity(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct EntityOptions {
    table_name: Option<String>,
}

#[derive(Default)]
struct FieldOptions {
    base: bool,
    unique: bool,
    readonly: bool,
    password: bool,
    owner: bool,
    skip: bool,
}

struct EntityField {
    ident: Ident,
    ty: Type,
    column: String,
    options: FieldOptions,
}

fn expand_entity(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.generics,
            "Entity does not support generic structs",
        ));
    }

    let entity_options = parse_entity_options(&input.attrs)?;

    let data_struct = match input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "Entity can only be derived for structs",
            ));
        }
    };

    let named_fields = match data_struct.fields {
        Fields::Named(fields) => fields,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "Entity requires named fields",
            ));
        }
    };

    let mut fields = Vec::<EntityField>::new();
    for field in named_fields.named {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new(field.span(), "Entity requires named fields"))?;
        let mut options = parse_field_options(&field.attrs)?;
        if !options.base && type_ends_with(&field.ty, "EntityBase") {
            options.base = true;
        }
        let column = ident.to_string().trim_start_matches("r#").to_string();
        fields.push(EntityField {
            ident,
            ty: field.ty,
            column,
            options,
        });
    }

    let base_field = single_field(&fields, &struct_name, "base", |o| o.base)?.ok_or_else(|| {
        syn::Error::new(
            struct_name.span(),
            "Entity requires an EntityBase field marked #[entity(base)]",
        )
    })?;
    let password_field = single_field(&fields, &struct_name, "password", |o| o.password)?;
    let owner_field = single_field(&fields, &struct_name, "owner", |o| o.owner)?;

    let columns = fields
        .iter()
        .filter(|field| !field.options.base && !field.options.skip)
        .collect::<Vec<_>>();

    for field in &columns {
        if BASE_COLUMNS.contains(&field.column.as_str()) {
            return Err(syn::Error::new(
                field.ident.span(),
                format!(
                    "column '{}' collides with a base column of every entity",
                    field.column
                ),
            ));
        }
    }

    let entity_name = struct_name.to_string();
    let table_name = entity_options
        .table_name
        .unwrap_or_else(|| to_snake_case(&entity_name));
    let base_ident = &base_field.ident;

    let column_defs = columns.iter().map(|field| {
        let name = &field.column;
        let ty = &field.ty;
        let unique = field.options.unique;
        let updatable = !field.options.readonly;
        quote! {
            ::modelkit::Column::new(#name, <#ty as ::modelkit::FieldValue>::TYPE_NAME)
                .nullable(<#ty as ::modelkit::FieldValue>::NULLABLE)
                .unique(#unique)
                .updatable(#updatable)
        }
    });

    if let Some(password) = password_field {
        let state_column = format!("{}__hashed", password.column);
        if let Some(clash) = columns.iter().find(|field| field.column == state_column) {
            return Err(syn::Error::new(
                clash.ident.span(),
                format!("column '{state_column}' is reserved for the password state"),
            ));
        }
    }

    let write_fields = columns.iter().map(|field| {
        let ident = &field.ident;
        let name = &field.column;
        if field.options.password {
            quote! {
                ::modelkit::entity::write_password(record, #name, &self.#ident);
            }
        } else {
            quote! {
                record.insert(#name.to_string(), ::modelkit::FieldValue::to_value(&self.#ident));
            }
        }
    });

    let from_record_fields = fields.iter().map(|field| {
        let ident = &field.ident;
        let name = &field.column;
        if field.options.base {
            quote! { #ident: ::modelkit::EntityBase::from_record(#entity_name, record)? }
        } else if field.options.skip {
            quote! { #ident: ::core::default::Default::default() }
        } else if field.options.password {
            quote! { #ident: ::modelkit::entity::read_password(#entity_name, #name, record)? }
        } else {
            quote! { #ident: ::modelkit::entity::decode_field(#entity_name, #name, record.get(#name))? }
        }
    });

    let setters = columns.iter().map(|field| {
        let ident = &field.ident;
        let name = &field.column;
        if field.options.readonly {
            quote! {
                #name => Err(::modelkit::ModelError::ReadOnlyField {
                    entity: #entity_name,
                    column: column.to_string(),
                }),
            }
        } else if field.options.password {
            quote! {
                #name => {
                    self.#ident = ::modelkit::entity::decode_password(#entity_name, #name, value)?;
                    Ok(())
                }
            }
        } else {
            quote! {
                #name => {
                    self.#ident = ::modelkit::entity::decode_field(#entity_name, #name, Some(value))?;
                    Ok(())
                }
            }
        }
    });

    let password_accessors = password_field.map(|field| {
        let ident = &field.ident;
        let name = &field.column;
        quote! {
            fn password_column() -> Option<&'static str> {
                Some(#name)
            }

            fn password(&self) -> Option<&::modelkit::Password> {
                Some(&self.#ident)
            }

            fn password_mut(&mut self) -> Option<&mut ::modelkit::Password> {
                Some(&mut self.#ident)
            }
        }
    });

    let owner_column = owner_field.map(|field| {
        let name = &field.column;
        quote! {
            fn owner_column() -> Option<&'static str> {
                Some(#name)
            }
        }
    });

    Ok(quote! {
        #[automatically_derived]
        impl ::modelkit::entity::Entity for #struct_name {
            fn entity_name() -> &'static str {
                #entity_name
            }

            fn table_name() -> &'static str {
                #table_name
            }

            fn columns() -> &'static [::modelkit::Column] {
                const COLUMNS: &[::modelkit::Column] = &[#(#column_defs),*];
                COLUMNS
            }

            fn base(&self) -> &::modelkit::EntityBase {
                &self.#base_ident
            }

            fn base_mut(&mut self) -> &mut ::modelkit::EntityBase {
                &mut self.#base_ident
            }

            fn write_fields(&self, record: &mut ::modelkit::Record) {
                let _ = &record;
                #(#write_fields)*
            }

            fn from_record(record: &::modelkit::Record) -> ::modelkit::Result<Self> {
                Ok(Self {
                    #(#from_record_fields),*
                })
            }

            fn set_field(
                &mut self,
                column: &str,
                value: &::modelkit::Value,
            ) -> ::modelkit::Result<()> {
                let _ = value;
                match column {
                    #(#setters)*
                    _ => Err(::modelkit::ModelError::UnknownField {
                        entity: #entity_name,
                        column: column.to_string(),
                    }),
                }
            }

            #password_accessors

            #owner_column
        }
    })
}

fn single_field<'a>(
    fields: &'a [EntityField],
    struct_name: &Ident,
    role: &str,
    pick: impl Fn(&FieldOptions) -> bool,
) -> syn::Result<Option<&'a EntityField>> {
    let mut marked = fields.iter().filter(|field| pick(&field.options));
    let first = marked.next();
    if let Some(extra) = marked.next() {
        return Err(syn::Error::new(
            extra.ident.span(),
            format!("{struct_name} may have only one #[entity({role})] field"),
        ));
    }
    Ok(first)
}

fn type_ends_with(ty: &Type, name: &str) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .map(|segment| segment.ident == name)
            .unwrap_or(false),
        _ => false,
    }
}

fn to_snake_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    for (index, ch) in value.chars().enumerate() {
        if ch.is_uppercase() {
            if index > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn parse_entity_options(attrs: &[syn::Attribute]) -> syn::Result<EntityOptions> {
    let mut options = EntityOptions::default();

    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value = meta.value()?;
                let lit: LitStr = value.parse()?;
                options.table_name = Some(lit.value());
                return Ok(());
            }

            Err(meta.error("Unsupported entity attribute. Supported: table = \"...\""))
        })?;
    }

    Ok(options)
}

fn parse_field_options(attrs: &[syn::Attribute]) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions::default();

    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            let flag = if meta.path.is_ident("base") {
                &mut options.base
            } else if meta.path.is_ident("unique") {
                &mut options.unique
            } else if meta.path.is_ident("readonly") {
                &mut options.readonly
            } else if meta.path.is_ident("password") {
                &mut options.password
            } else if meta.path.is_ident("owner") {
                &mut options.owner
            } else if meta.path.is_ident("skip") {
                &mut options.skip
            } else {
                return Err(meta.error(
                    "Unsupported #[entity(...)] option. Supported: base, unique, readonly, password, owner, skip",
                ));
            };
            *flag = true;
            Ok(())
        })?;
    }

    if options.skip && (options.unique || options.password || options.owner || options.base) {
        return Err(syn::Error::new(
            proc_macro2::Span::call_site(),
            "#[entity(skip)] cannot be combined with other column options",
        ));
    }

    Ok(options)
}
