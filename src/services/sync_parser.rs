// src/services/sync_parser.rs
//
// Interpreta o documento de upload do SyncEntity. Sem estado e sem I/O:
// valida a estrutura, resolve as chaves e registra quais campos vieram.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use rust_decimal::{prelude::FromPrimitive, Decimal};
use serde_json::{Map, Value};

use crate::{
    common::error::AppError,
    models::{
        inventory::{
            category_id_from_client, Branch, BranchCategory, BranchItem, Category, CompositeId, Item,
            ROOT_CATEGORY_ID,
        },
        revision::EntityKind,
        sync::{
            BranchField, BranchItemField, CategoryField, FieldMask, ItemField, KindUpload, MemberField,
            ParsedUpload, PostType, SyncCursors, SyncRecord,
        },
        tenancy::{Member, PermissionType},
    },
};

fn invalid(message: impl Into<String>) -> AppError {
    AppError::InvalidArgument(message.into())
}

// ---
// 1. Leitor de campos de um objeto de `fields[]`
// ---
struct FieldReader<'a> {
    kind: EntityKind,
    object: &'a Map<String, Value>,
}

impl<'a> FieldReader<'a> {
    // `null` conta como ausente
    fn get(&self, name: &str) -> Option<&'a Value> {
        self.object.get(name).filter(|v| !v.is_null())
    }

    fn wrong_type(&self, name: &str, expected: &str) -> AppError {
        invalid(format!("{}.{}: esperado {}", self.kind.body_key(), name, expected))
    }

    fn i64(&self, name: &str) -> Result<Option<i64>, AppError> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v.as_i64().map(Some).ok_or_else(|| self.wrong_type(name, "inteiro")),
        }
    }

    fn i32(&self, name: &str) -> Result<Option<i32>, AppError> {
        match self.i64(name)? {
            None => Ok(None),
            Some(v) => i32::try_from(v).map(Some).map_err(|_| self.wrong_type(name, "inteiro de 32 bits")),
        }
    }

    fn f64(&self, name: &str) -> Result<Option<f64>, AppError> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v.as_f64().map(Some).ok_or_else(|| self.wrong_type(name, "número")),
        }
    }

    fn bool(&self, name: &str) -> Result<Option<bool>, AppError> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v.as_bool().map(Some).ok_or_else(|| self.wrong_type(name, "booleano")),
        }
    }

    fn string(&self, name: &str) -> Result<Option<String>, AppError> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v.as_str().map(|s| Some(s.to_string())).ok_or_else(|| self.wrong_type(name, "texto")),
        }
    }

    fn i64_list(&self, name: &str) -> Result<Option<Vec<i64>>, AppError> {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };
        let array = value.as_array().ok_or_else(|| self.wrong_type(name, "lista de inteiros"))?;
        array
            .iter()
            .map(|v| v.as_i64().ok_or_else(|| self.wrong_type(name, "lista de inteiros")))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    fn required_i64(&self, name: &str) -> Result<i64, AppError> {
        self.i64(name)?
            .ok_or_else(|| invalid(format!("{}: campo '{}' é obrigatório", self.kind.body_key(), name)))
    }

    fn required_composite(&self, name: &str) -> Result<CompositeId, AppError> {
        let raw = self
            .string(name)?
            .ok_or_else(|| invalid(format!("{}: campo '{}' é obrigatório", self.kind.body_key(), name)))?;
        CompositeId::parse(&raw)
    }
}

// ---
// 2. Um parser por tipo: chave + registro esparso
// ---
type ParsedRecord<T, K> = (K, FieldMask, T);

fn parse_category(r: &FieldReader) -> Result<ParsedRecord<Category, i64>, AppError> {
    let category_id = r.required_i64("category_id")?;
    let mut fields = FieldMask::default();
    let mut values = Category { category_id, parent_id: ROOT_CATEGORY_ID, ..Default::default() };

    if let Some(parent_id) = r.i64("parent_id")? {
        values.parent_id = category_id_from_client(parent_id);
        fields.insert(CategoryField::ParentId);
    }
    if let Some(name) = r.string("name")? {
        values.name = name;
        fields.insert(CategoryField::Name);
    }
    if let Some(client_uuid) = r.string("client_uuid")? {
        values.client_uuid = client_uuid;
        fields.insert(CategoryField::ClientUuid);
    }
    Ok((category_id, fields, values))
}

fn parse_item(r: &FieldReader) -> Result<ParsedRecord<Item, i64>, AppError> {
    let item_id = r.required_i64("item_id")?;
    let mut fields = FieldMask::default();
    let mut values = Item { item_id, category_id: ROOT_CATEGORY_ID, ..Default::default() };

    if let Some(category_id) = r.i64("category_id")? {
        values.category_id = category_id_from_client(category_id);
        fields.insert(ItemField::CategoryId);
    }
    if let Some(client_uuid) = r.string("client_uuid")? {
        values.client_uuid = client_uuid;
        fields.insert(ItemField::ClientUuid);
    }
    if let Some(name) = r.string("name")? {
        values.name = name;
        fields.insert(ItemField::Name);
    }
    if let Some(item_code) = r.string("item_code")? {
        values.item_code = item_code;
        fields.insert(ItemField::ItemCode);
    }
    if let Some(unit) = r.string("unit_of_measurement")? {
        values.unit_of_measurement = unit;
        fields.insert(ItemField::UnitOfMeasurement);
    }
    if let Some(has_derived_unit) = r.bool("has_derived_unit")? {
        values.has_derived_unit = has_derived_unit;
        fields.insert(ItemField::HasDerivedUnit);
    }
    if let Some(derived_name) = r.string("derived_name")? {
        values.derived_name = derived_name;
        fields.insert(ItemField::DerivedName);
    }
    if let Some(derived_factor) = r.f64("derived_factor")? {
        values.derived_factor = derived_factor;
        fields.insert(ItemField::DerivedFactor);
    }
    if let Some(status_flag) = r.i32("status_flag")? {
        values.status_flag = status_flag;
        fields.insert(ItemField::StatusFlag);
    }
    Ok((item_id, fields, values))
}

fn parse_branch(r: &FieldReader) -> Result<ParsedRecord<Branch, i64>, AppError> {
    let branch_id = r.required_i64("branch_id")?;
    let mut fields = FieldMask::default();
    let mut values = Branch { branch_id, ..Default::default() };

    if let Some(client_uuid) = r.string("client_uuid")? {
        values.client_uuid = client_uuid;
        fields.insert(BranchField::ClientUuid);
    }
    if let Some(name) = r.string("name")? {
        values.name = name;
        fields.insert(BranchField::Name);
    }
    if let Some(location) = r.string("location")? {
        values.location = location;
        fields.insert(BranchField::Location);
    }
    if let Some(status_flag) = r.i32("status_flag")? {
        values.status_flag = status_flag;
        fields.insert(BranchField::StatusFlag);
    }
    Ok((branch_id, fields, values))
}

fn parse_branch_item(r: &FieldReader) -> Result<ParsedRecord<BranchItem, CompositeId>, AppError> {
    let key = r.required_composite("branch_item_id")?;
    let mut fields = FieldMask::default();
    let mut values = BranchItem { branch_id: key.0, item_id: key.1, ..Default::default() };

    if let Some(quantity) = r.f64("quantity")? {
        values.quantity = Decimal::from_f64(quantity).ok_or_else(|| r.wrong_type("quantity", "número finito"))?;
        fields.insert(BranchItemField::Quantity);
    }
    if let Some(item_location) = r.string("item_location")? {
        values.item_location = item_location;
        fields.insert(BranchItemField::ItemLocation);
    }
    Ok((key, fields, values))
}

fn parse_branch_category(r: &FieldReader) -> Result<ParsedRecord<BranchCategory, CompositeId>, AppError> {
    let key = r.required_composite("branch_category_id")?;
    let values = BranchCategory { branch_id: key.0, category_id: key.1, ..Default::default() };
    Ok((key, FieldMask::default(), values))
}

fn parse_member(r: &FieldReader) -> Result<ParsedRecord<Member, i64>, AppError> {
    let user_id = r.required_i64("user_id")?;
    let mut fields = FieldMask::default();
    let mut values = Member { user_id, ..Default::default() };

    if let Some(raw) = r.get("permission_type") {
        values.permission_type = serde_json::from_value::<PermissionType>(raw.clone())
            .map_err(|_| r.wrong_type("permission_type", "tipo de permissão"))?;
        fields.insert(MemberField::PermissionType);
    }
    if let Some(branches) = r.i64_list("branches_allowed")? {
        values.branches_allowed = branches;
        fields.insert(MemberField::BranchesAllowed);
    }
    if let Some(stores) = r.i64_list("stores_allowed")? {
        values.stores_allowed = stores;
        fields.insert(MemberField::StoresAllowed);
    }
    Ok((user_id, fields, values))
}

// ---
// 3. Montagem genérica do corpo de um tipo
// ---
fn simple_key(kind: EntityKind, value: &Value) -> Result<i64, AppError> {
    value
        .as_i64()
        .ok_or_else(|| invalid(format!("{}: ids devem ser inteiros", kind.body_key())))
}

fn composite_key(kind: EntityKind, value: &Value) -> Result<CompositeId, AppError> {
    let raw = value
        .as_str()
        .ok_or_else(|| invalid(format!("{}: ids compostos devem ser texto", kind.body_key())))?;
    CompositeId::parse(raw)
}

fn id_list<K: Ord + Copy + Display>(
    body: &Map<String, Value>,
    list: &str,
    kind: EntityKind,
    parse_key: fn(EntityKind, &Value) -> Result<K, AppError>,
) -> Result<Vec<K>, AppError> {
    let ids: Vec<K> = match body.get(list) {
        None | Some(Value::Null) => return Ok(vec![]),
        Some(Value::Array(ids)) => ids.iter().map(|id| parse_key(kind, id)).collect::<Result<_, _>>()?,
        Some(_) => return Err(invalid(format!("{}.{}: esperado lista de ids", kind.body_key(), list))),
    };

    let mut seen = BTreeSet::new();
    if let Some(repeated) = ids.iter().find(|id| !seen.insert(**id)) {
        return Err(invalid(format!("{}.{}: id {} repetido", kind.body_key(), list, repeated)));
    }
    Ok(ids)
}

fn parse_kind<T, K>(
    document: &Map<String, Value>,
    kind: EntityKind,
    parse_key: fn(EntityKind, &Value) -> Result<K, AppError>,
    parse_record: fn(&FieldReader) -> Result<ParsedRecord<T, K>, AppError>,
) -> Result<KindUpload<T, K>, AppError>
where
    T: Clone,
    K: Ord + Copy + Display,
{
    let Some(body) = document.get(kind.body_key()).filter(|v| !v.is_null()) else {
        return Ok(KindUpload::default());
    };
    let body = body
        .as_object()
        .ok_or_else(|| invalid(format!("{}: esperado objeto", kind.body_key())))?;

    let create = id_list(body, "create", kind, parse_key)?;
    let update = id_list(body, "update", kind, parse_key)?;
    let delete = id_list(body, "delete", kind, parse_key)?;

    let mut records: BTreeMap<K, (FieldMask, T)> = BTreeMap::new();
    match body.get("fields") {
        None | Some(Value::Null) => {}
        Some(Value::Array(entries)) => {
            for entry in entries {
                let object = entry
                    .as_object()
                    .ok_or_else(|| invalid(format!("{}.fields: esperado objeto", kind.body_key())))?;
                let (key, fields, values) = parse_record(&FieldReader { kind, object })?;

                if !create.contains(&key) && !update.contains(&key) && !delete.contains(&key) {
                    return Err(invalid(format!(
                        "{}: id {} aparece em fields mas não em create/update/delete",
                        kind.body_key(),
                        key
                    )));
                }
                if records.insert(key, (fields, values)).is_some() {
                    return Err(invalid(format!("{}: id {} repetido em fields", kind.body_key(), key)));
                }
            }
        }
        Some(_) => return Err(invalid(format!("{}.fields: esperado lista", kind.body_key()))),
    }

    let record = |op: PostType, key: K| -> Result<SyncRecord<T>, AppError> {
        let (fields, values) = records
            .get(&key)
            .cloned()
            .ok_or_else(|| invalid(format!("{}: id {} sem entrada em fields", kind.body_key(), key)))?;
        Ok(SyncRecord { op, fields, values })
    };

    let mut upload = KindUpload::default();
    for key in create {
        upload.create.push(record(PostType::Create, key)?);
    }
    for key in update {
        upload.update.push(record(PostType::Update, key)?);
    }
    upload.delete = delete;
    Ok(upload)
}

fn cursor(document: &Map<String, Value>, name: &str) -> Result<i64, AppError> {
    match document.get(name) {
        None | Some(Value::Null) => Ok(0),
        Some(value) => match value.as_i64() {
            Some(rev) if rev >= 0 => Ok(rev),
            _ => Err(invalid(format!("{}: esperado inteiro não negativo", name))),
        },
    }
}

/// Interpreta o documento inteiro do SyncEntity.
pub fn parse_upload(document: &Value) -> Result<ParsedUpload, AppError> {
    let document = document
        .as_object()
        .ok_or_else(|| invalid("O corpo do upload deve ser um objeto"))?;

    let mut parsed = ParsedUpload {
        cursors: SyncCursors {
            item_rev: cursor(document, "item_rev")?,
            branch_rev: cursor(document, "branch_rev")?,
            branch_item_rev: cursor(document, "branch_item_rev")?,
            member_rev: cursor(document, "member_rev")?,
            category_rev: cursor(document, "category_rev")?,
            branch_category_rev: cursor(document, "branch_category_rev")?,
        },
        ..Default::default()
    };

    let types = match document.get("types") {
        None | Some(Value::Null) => return Ok(parsed),
        Some(Value::Array(types)) => types,
        Some(_) => return Err(invalid("types: esperado lista de tipos")),
    };

    for entry in types {
        let name = entry.as_str().ok_or_else(|| invalid("types: esperado texto"))?;
        let kind = EntityKind::parse(name).ok_or_else(|| invalid(format!("types: tipo desconhecido '{}'", name)))?;

        match kind {
            EntityKind::Category => {
                let upload = parse_kind(document, kind, simple_key, parse_category)?;
                require_negative_creates(kind, upload.create.iter().map(|r| r.values.category_id))?;
                parsed.categories = Some(upload);
            }
            EntityKind::Item => {
                let upload = parse_kind(document, kind, simple_key, parse_item)?;
                require_negative_creates(kind, upload.create.iter().map(|r| r.values.item_id))?;
                parsed.items = Some(upload);
            }
            EntityKind::Branch => {
                let upload = parse_kind(document, kind, simple_key, parse_branch)?;
                require_negative_creates(kind, upload.create.iter().map(|r| r.values.branch_id))?;
                parsed.branches = Some(upload);
            }
            EntityKind::BranchItem => {
                parsed.branch_items = Some(parse_kind(document, kind, composite_key, parse_branch_item)?);
            }
            EntityKind::BranchCategory => {
                parsed.branch_categories = Some(parse_kind(document, kind, composite_key, parse_branch_category)?);
            }
            EntityKind::Member => {
                let upload = parse_kind(document, kind, simple_key, parse_member)?;
                if !upload.create.is_empty() {
                    return Err(invalid("member: funcionários entram pelo AddEmployee, não pelo sync"));
                }
                parsed.members = Some(upload);
            }
            EntityKind::Transaction => {
                return Err(invalid("types: TRANSACTION é sincronizado pelo SyncTransaction"));
            }
        }
    }

    Ok(parsed)
}

// Ids de create são sempre locais do cliente
fn require_negative_creates(kind: EntityKind, ids: impl Iterator<Item = i64>) -> Result<(), AppError> {
    for id in ids {
        if id >= 0 {
            return Err(invalid(format!("{}: create com id não local {}", kind.body_key(), id)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assert_invalid(document: Value) {
        match parse_upload(&document) {
            Err(AppError::InvalidArgument(_)) => {}
            other => panic!("esperado INVALID_ARGUMENT, veio {:?}", other),
        }
    }

    #[test]
    fn missing_types_is_a_no_op_upload() {
        let parsed = parse_upload(&json!({ "item_rev": 4 })).unwrap();
        assert_eq!(parsed.cursors.item_rev, 4);
        assert_eq!(parsed.cursors.branch_rev, 0);
        assert!(parsed.items.is_none());
        assert!(parsed.categories.is_none());
    }

    #[test]
    fn sparse_update_tracks_supplied_fields_only() {
        let parsed = parse_upload(&json!({
            "types": ["ITEM"],
            "item": {
                "update": [12],
                "fields": [{ "item_id": 12, "name": "Parafuso", "status_flag": 0 }]
            }
        }))
        .unwrap();

        let items = parsed.items.unwrap();
        assert_eq!(items.update.len(), 1);
        let record = &items.update[0];
        assert_eq!(record.op, PostType::Update);
        assert!(record.fields.contains(ItemField::Name));
        assert!(record.fields.contains(ItemField::StatusFlag));
        assert!(!record.fields.contains(ItemField::CategoryId));
        assert!(!record.fields.contains(ItemField::ItemCode));
        assert_eq!(record.values.name, "Parafuso");
    }

    #[test]
    fn create_defaults_and_root_translation() {
        let parsed = parse_upload(&json!({
            "types": ["CATEGORY", "ITEM"],
            "category": {
                "create": [-1, -2],
                "fields": [
                    { "category_id": -1, "parent_id": -3, "name": "Ferragens", "client_uuid": "c1" },
                    { "category_id": -2, "name": "Tintas", "client_uuid": "c2" }
                ]
            },
            "item": {
                "create": [-7],
                "fields": [{ "item_id": -7, "client_uuid": "i7" }]
            }
        }))
        .unwrap();

        let categories = parsed.categories.unwrap();
        assert_eq!(categories.create[0].values.parent_id, ROOT_CATEGORY_ID);
        assert_eq!(categories.create[1].values.parent_id, ROOT_CATEGORY_ID);
        assert!(!categories.create[1].fields.contains(CategoryField::ParentId));

        let items = parsed.items.unwrap();
        let item = &items.create[0].values;
        assert_eq!(item.category_id, ROOT_CATEGORY_ID);
        assert_eq!(item.name, "");
        assert_eq!(item.derived_factor, 0.0);
    }

    #[test]
    fn composite_ids_resolve_both_halves() {
        let parsed = parse_upload(&json!({
            "types": ["BRANCH_ITEM", "BRANCH_CATEGORY"],
            "branch_item": {
                "create": ["-1:-2"],
                "fields": [{ "branch_item_id": "-1:-2", "item_location": "A3", "quantity": 99.5 }]
            },
            "branch_category": {
                "create": ["4:-9"],
                "delete": ["4:7"],
                "fields": [{ "branch_category_id": "4:-9" }]
            }
        }))
        .unwrap();

        let branch_items = parsed.branch_items.unwrap();
        assert_eq!(branch_items.create[0].values.branch_id, -1);
        assert_eq!(branch_items.create[0].values.item_id, -2);
        assert!(branch_items.create[0].fields.contains(BranchItemField::ItemLocation));

        let branch_categories = parsed.branch_categories.unwrap();
        assert_eq!(branch_categories.create[0].values.category_id, -9);
        assert_eq!(branch_categories.delete, vec![CompositeId(4, 7)]);
    }

    #[test]
    fn member_records_parse_permission_fields() {
        let parsed = parse_upload(&json!({
            "types": ["MEMBER"],
            "member": {
                "update": [5],
                "fields": [{ "user_id": 5, "permission_type": "BRANCH_CASHIER", "branches_allowed": [1, 2] }]
            }
        }))
        .unwrap();

        let record = &parsed.members.unwrap().update[0];
        assert_eq!(record.values.permission_type, PermissionType::BranchCashier);
        assert_eq!(record.values.branches_allowed, vec![1, 2]);
        assert!(!record.fields.contains(MemberField::StoresAllowed));
    }

    #[test]
    fn id_in_fields_but_in_no_list_is_rejected() {
        assert_invalid(json!({
            "types": ["ITEM"],
            "item": { "update": [1], "fields": [{ "item_id": 2, "name": "x" }] }
        }));
    }

    #[test]
    fn repeated_id_in_one_list_is_rejected() {
        assert_invalid(json!({
            "types": ["ITEM"],
            "item": { "update": [12, 12], "fields": [{ "item_id": 12, "name": "x" }] }
        }));
        assert_invalid(json!({
            "types": ["ITEM"],
            "item": { "create": [-1, -1], "fields": [{ "item_id": -1, "client_uuid": "u" }] }
        }));
        assert_invalid(json!({
            "types": ["BRANCH_ITEM"],
            "branch_item": { "delete": ["3:4", "3:4"] }
        }));
    }

    #[test]
    fn missing_primary_key_is_rejected() {
        assert_invalid(json!({
            "types": ["BRANCH"],
            "branch": { "create": [-1], "fields": [{ "name": "Centro" }] }
        }));
    }

    #[test]
    fn wrong_field_type_is_rejected() {
        assert_invalid(json!({
            "types": ["ITEM"],
            "item": { "create": [-1], "fields": [{ "item_id": -1, "client_uuid": "u", "name": 10 }] }
        }));
        assert_invalid(json!({
            "types": ["ITEM"],
            "item": { "create": [-1], "fields": [{ "item_id": -1, "client_uuid": "u", "has_derived_unit": "sim" }] }
        }));
    }

    #[test]
    fn malformed_composite_id_is_rejected() {
        for bad in ["1:", ":2", "12", "a:b"] {
            assert_invalid(json!({
                "types": ["BRANCH_ITEM"],
                "branch_item": { "delete": [bad] }
            }));
        }
    }

    #[test]
    fn unknown_or_unsupported_kinds_are_rejected() {
        assert_invalid(json!({ "types": ["WAREHOUSE"] }));
        assert_invalid(json!({ "types": ["TRANSACTION"] }));
        assert_invalid(json!({ "types": "ITEM" }));
    }

    #[test]
    fn member_creates_and_positive_creates_are_rejected() {
        assert_invalid(json!({
            "types": ["MEMBER"],
            "member": { "create": [-1], "fields": [{ "user_id": -1 }] }
        }));
        assert_invalid(json!({
            "types": ["CATEGORY"],
            "category": { "create": [4], "fields": [{ "category_id": 4, "client_uuid": "c" }] }
        }));
    }

    #[test]
    fn negative_cursor_is_rejected() {
        assert_invalid(json!({ "category_rev": -1 }));
        assert_invalid(json!({ "item_rev": "3" }));
    }
}
