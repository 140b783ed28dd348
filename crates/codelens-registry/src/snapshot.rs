//! Immutable, fully indexed view of one bulk load.
//!
//! A snapshot is built once and never mutated. The registry swaps whole
//! snapshots, so every query sees one consistent set of collections and
//! derived indexes.

use chrono::{DateTime, Utc};
use codelens_core::naming::{
    initials, soundex, split_identifier, to_camel_case, to_pascal_case, to_snake_case,
};
use codelens_core::{
    ClassEntity, ClassRecord, EntityId, EntityMatch, EntitySnapshotFile, EntityType, MatchType,
    MethodEntity, MethodRecord, PackageEntity, PackageRecord, Vocabulary,
};
use codelens_index::{BkTree, Trie};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::scoring::{
    affix_confidence, edit_distance_confidence, ABBREVIATION_CONFIDENCE,
    COMPOUND_INDEX_CONFIDENCE, COMPOUND_NAME_CONFIDENCE, EXACT_CONFIDENCE, PHONETIC_CONFIDENCE,
};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct IndexedName {
    entity_type: EntityType,
    name: String,
}

type NameIndex = FxHashMap<String, BTreeSet<IndexedName>>;

fn index_name(index: &mut NameIndex, key: String, entity_type: EntityType, name: &str) {
    index.entry(key).or_default().insert(IndexedName {
        entity_type,
        name: name.to_string(),
    });
}

/// Soundex codes of each token joined by `-`, e.g. `P553-S612` for `PaymentService`.
fn phonetic_key<S: AsRef<str>>(tokens: &[S]) -> Option<String> {
    let codes: Vec<String> = tokens.iter().filter_map(|t| soundex(t.as_ref())).collect();
    if codes.is_empty() {
        None
    } else {
        Some(codes.join("-"))
    }
}

/// Lowercase-keyed pattern indexes. Values are original names.
#[derive(Default)]
struct PatternIndexes {
    suffix: NameIndex,
    prefix: NameIndex,
    compound: NameIndex,
    phonetic: NameIndex,
    abbreviation: NameIndex,
}

impl PatternIndexes {
    fn add_shape(&mut self, entity_type: EntityType, name: &str, tokens: &[String]) {
        let lowered: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();

        // Every contiguous run of two or more tokens
        for start in 0..lowered.len() {
            for end in (start + 2)..=lowered.len() {
                index_name(
                    &mut self.compound,
                    lowered[start..end].join("_"),
                    entity_type,
                    name,
                );
            }
        }

        if lowered.len() >= 2 {
            index_name(&mut self.abbreviation, initials(tokens), entity_type, name);
        }

        if let Some(key) = phonetic_key(tokens) {
            index_name(&mut self.phonetic, key, entity_type, name);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryStats {
    pub generation: u64,
    pub classes: usize,
    pub methods: usize,
    pub packages: usize,
    pub skipped_records: usize,
    pub loaded_at: Option<DateTime<Utc>>,
}

/// Candidate matches keyed by entity id, keeping the most confident one.
#[derive(Default)]
struct MatchSet {
    by_id: FxHashMap<EntityId, EntityMatch>,
}

impl MatchSet {
    fn offer(&mut self, candidate: EntityMatch) {
        match self.by_id.entry(candidate.entity_id.clone()) {
            Entry::Occupied(mut existing) => {
                if candidate.confidence > existing.get().confidence {
                    existing.insert(candidate);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(candidate);
            }
        }
    }

    fn into_sorted(self) -> Vec<EntityMatch> {
        let mut matches: Vec<EntityMatch> = self.by_id.into_values().collect();
        matches.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        matches
    }
}

pub struct RegistrySnapshot {
    generation: u64,
    loaded_at: Option<DateTime<Utc>>,
    skipped_records: usize,

    classes: FxHashMap<EntityId, Arc<ClassEntity>>,
    methods: FxHashMap<EntityId, Arc<MethodEntity>>,
    packages: FxHashMap<String, Arc<PackageEntity>>,

    class_ids_by_name: FxHashMap<String, Vec<EntityId>>,
    method_ids_by_name: FxHashMap<String, Vec<EntityId>>,
    method_ids_by_class: FxHashMap<String, Vec<EntityId>>,
    class_names_by_lower: FxHashMap<String, BTreeSet<String>>,
    method_names_by_lower: FxHashMap<String, BTreeSet<String>>,

    patterns: PatternIndexes,

    class_tree: BkTree,
    method_tree: BkTree,
    class_trie: Trie,
    method_trie: Trie,
}

impl RegistrySnapshot {
    /// Generation 0: nothing loaded yet.
    pub fn empty() -> Self {
        Self {
            generation: 0,
            loaded_at: None,
            skipped_records: 0,
            classes: FxHashMap::default(),
            methods: FxHashMap::default(),
            packages: FxHashMap::default(),
            class_ids_by_name: FxHashMap::default(),
            method_ids_by_name: FxHashMap::default(),
            method_ids_by_class: FxHashMap::default(),
            class_names_by_lower: FxHashMap::default(),
            method_names_by_lower: FxHashMap::default(),
            patterns: PatternIndexes::default(),
            class_tree: BkTree::new(),
            method_tree: BkTree::new(),
            class_trie: Trie::new(),
            method_trie: Trie::new(),
        }
    }

    /// Build every index from already-validated entities in one pass.
    ///
    /// A later entity with an id seen before replaces the earlier one and is
    /// counted as skipped.
    pub fn build(
        generation: u64,
        classes: Vec<Arc<ClassEntity>>,
        methods: Vec<Arc<MethodEntity>>,
        packages: Vec<Arc<PackageEntity>>,
        skipped_records: usize,
    ) -> Self {
        let mut skipped_records = skipped_records;

        let mut class_map: FxHashMap<EntityId, Arc<ClassEntity>> = FxHashMap::default();
        for class in classes {
            if let Some(replaced) = class_map.insert(class.id.clone(), class) {
                warn!(id = %replaced.id, "duplicate class id, keeping the later record");
                skipped_records += 1;
            }
        }

        let mut method_map: FxHashMap<EntityId, Arc<MethodEntity>> = FxHashMap::default();
        for method in methods {
            if let Some(replaced) = method_map.insert(method.id.clone(), method) {
                warn!(id = %replaced.id, "duplicate method id, keeping the later record");
                skipped_records += 1;
            }
        }

        let mut package_map: FxHashMap<String, Arc<PackageEntity>> = FxHashMap::default();
        for package in packages {
            package_map.insert(package.name.clone(), package);
        }

        let mut patterns = PatternIndexes::default();
        let mut class_ids_by_name: FxHashMap<String, Vec<EntityId>> = FxHashMap::default();
        let mut class_names_by_lower: FxHashMap<String, BTreeSet<String>> = FxHashMap::default();

        let mut sorted_classes: Vec<&Arc<ClassEntity>> = class_map.values().collect();
        sorted_classes.sort_by(|a, b| a.id.cmp(&b.id));
        for class in sorted_classes {
            class_ids_by_name
                .entry(class.name.clone())
                .or_default()
                .push(class.id.clone());
            class_names_by_lower
                .entry(class.name.to_lowercase())
                .or_default()
                .insert(class.name.clone());

            if let Some(suffix) = &class.suffix {
                index_name(
                    &mut patterns.suffix,
                    suffix.to_lowercase(),
                    EntityType::Class,
                    &class.name,
                );
            }
            if let Some(prefix) = &class.prefix {
                index_name(
                    &mut patterns.prefix,
                    prefix.to_lowercase(),
                    EntityType::Class,
                    &class.name,
                );
            }
            patterns.add_shape(EntityType::Class, &class.name, &class.name_tokens);
        }

        let mut method_ids_by_name: FxHashMap<String, Vec<EntityId>> = FxHashMap::default();
        let mut method_ids_by_class: FxHashMap<String, Vec<EntityId>> = FxHashMap::default();
        let mut method_names_by_lower: FxHashMap<String, BTreeSet<String>> = FxHashMap::default();

        let mut sorted_methods: Vec<&Arc<MethodEntity>> = method_map.values().collect();
        sorted_methods.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        for method in sorted_methods {
            method_ids_by_name
                .entry(method.name.clone())
                .or_default()
                .push(method.id.clone());
            method_names_by_lower
                .entry(method.name.to_lowercase())
                .or_default()
                .insert(method.name.clone());
            if !method.class_name.is_empty() {
                method_ids_by_class
                    .entry(method.class_name.clone())
                    .or_default()
                    .push(method.id.clone());
            }

            if let Some(prefix) = &method.prefix {
                index_name(
                    &mut patterns.prefix,
                    prefix.clone(),
                    EntityType::Method,
                    &method.name,
                );
            }
            patterns.add_shape(EntityType::Method, &method.name, &method.name_tokens);
        }

        let mut class_keys: Vec<&str> = class_names_by_lower.keys().map(String::as_str).collect();
        class_keys.sort_unstable();
        let mut method_keys: Vec<&str> = method_names_by_lower.keys().map(String::as_str).collect();
        method_keys.sort_unstable();

        let ((class_tree, method_tree), (class_trie, method_trie)) = rayon::join(
            || {
                rayon::join(
                    || class_keys.iter().copied().collect::<BkTree>(),
                    || method_keys.iter().copied().collect::<BkTree>(),
                )
            },
            || {
                (
                    class_keys.iter().copied().collect::<Trie>(),
                    method_keys.iter().copied().collect::<Trie>(),
                )
            },
        );

        debug!(
            generation,
            classes = class_map.len(),
            methods = method_map.len(),
            packages = package_map.len(),
            "built registry snapshot"
        );

        Self {
            generation,
            loaded_at: Some(Utc::now()),
            skipped_records,
            classes: class_map,
            methods: method_map,
            packages: package_map,
            class_ids_by_name,
            method_ids_by_name,
            method_ids_by_class,
            class_names_by_lower,
            method_names_by_lower,
            patterns,
            class_tree,
            method_tree,
            class_trie,
            method_trie,
        }
    }

    /// Validate raw records and build a snapshot from them.
    pub fn from_file(generation: u64, file: EntitySnapshotFile, vocabulary: &Vocabulary) -> Self {
        let mut skipped = 0;
        let classes = classes_from_records(file.classes, vocabulary, &mut skipped);
        let methods = methods_from_records(file.methods, vocabulary, &mut skipped);
        let packages = packages_from_records(file.packages, &mut skipped);
        Self::build(generation, classes, methods, packages, skipped)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    pub fn skipped_records(&self) -> usize {
        self.skipped_records
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.methods.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            generation: self.generation,
            classes: self.classes.len(),
            methods: self.methods.len(),
            packages: self.packages.len(),
            skipped_records: self.skipped_records,
            loaded_at: self.loaded_at,
        }
    }

    pub fn class(&self, id: &str) -> Option<&Arc<ClassEntity>> {
        self.classes.get(id)
    }

    pub fn method(&self, id: &str) -> Option<&Arc<MethodEntity>> {
        self.methods.get(id)
    }

    pub fn package(&self, name: &str) -> Option<&Arc<PackageEntity>> {
        self.packages.get(name)
    }

    /// Methods owned by the class with simple name `class_name`, ordered by name.
    pub fn methods_of_class(&self, class_name: &str) -> Vec<&Arc<MethodEntity>> {
        self.method_ids_by_class
            .get(class_name)
            .into_iter()
            .flatten()
            .filter_map(|id| self.methods.get(id))
            .collect()
    }

    /// True when `entity_id` (as carried by an `EntityMatch`) resolves in this snapshot.
    pub fn contains_id(&self, entity_id: &str) -> bool {
        if let Some(package) = entity_id.strip_prefix("package:") {
            if self.packages.contains_key(package) {
                return true;
            }
        }
        self.classes.contains_key(entity_id) || self.methods.contains_key(entity_id)
    }

    pub fn classes(&self) -> impl Iterator<Item = &Arc<ClassEntity>> {
        self.classes.values()
    }

    pub fn methods(&self) -> impl Iterator<Item = &Arc<MethodEntity>> {
        self.methods.values()
    }

    pub fn packages(&self) -> impl Iterator<Item = &Arc<PackageEntity>> {
        self.packages.values()
    }

    /// Distinct class names, sorted.
    pub fn class_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.class_ids_by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Distinct method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.method_ids_by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn classes_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a ClassEntity> + 'a {
        self.class_ids_by_name
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.classes.get(id))
            .map(|c| c.as_ref())
    }

    fn methods_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a MethodEntity> + 'a {
        self.method_ids_by_name
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.methods.get(id))
            .map(|m| m.as_ref())
    }

    fn classes_lower<'a>(&'a self, lower: &str) -> impl Iterator<Item = &'a ClassEntity> + 'a {
        self.class_names_by_lower
            .get(lower)
            .into_iter()
            .flatten()
            .flat_map(move |name| self.classes_named(name))
    }

    fn methods_lower<'a>(&'a self, lower: &str) -> impl Iterator<Item = &'a MethodEntity> + 'a {
        self.method_names_by_lower
            .get(lower)
            .into_iter()
            .flatten()
            .flat_map(move |name| self.methods_named(name))
    }

    fn offer_indexed(
        &self,
        found: &mut MatchSet,
        indexed: &IndexedName,
        match_type: MatchType,
        confidence: f32,
        reason: &str,
    ) {
        match indexed.entity_type {
            EntityType::Class => {
                for class in self.classes_named(&indexed.name) {
                    found.offer(EntityMatch::for_class(class, match_type, confidence, reason));
                }
            }
            EntityType::Method => {
                for method in self.methods_named(&indexed.name) {
                    found.offer(EntityMatch::for_method(method, match_type, confidence, reason));
                }
            }
            EntityType::Package => {
                if let Some(package) = self.packages.get(&indexed.name) {
                    found.offer(EntityMatch::for_package(package, match_type, confidence, reason));
                }
            }
        }
    }

    /// Case-sensitive name equality over classes, methods and packages.
    pub fn find_exact_matches(&self, term: &str) -> Vec<EntityMatch> {
        let term = term.trim();
        if term.is_empty() {
            return Vec::new();
        }

        let reason = format!("exact name match for '{}'", term);
        let mut found = MatchSet::default();
        for class in self.classes_named(term) {
            found.offer(EntityMatch::for_class(
                class,
                MatchType::Exact,
                EXACT_CONFIDENCE,
                reason.as_str(),
            ));
        }
        for method in self.methods_named(term) {
            found.offer(EntityMatch::for_method(
                method,
                MatchType::Exact,
                EXACT_CONFIDENCE,
                reason.as_str(),
            ));
        }
        if let Some(package) = self.packages.get(term) {
            found.offer(EntityMatch::for_package(
                package,
                MatchType::Exact,
                EXACT_CONFIDENCE,
                reason.as_str(),
            ));
        }
        found.into_sorted()
    }

    /// Names starting with `term`, case-insensitive. Trie hits are unioned with
    /// the derived-prefix index.
    pub fn find_by_prefix(&self, term: &str) -> Vec<EntityMatch> {
        let term = term.trim();
        if term.is_empty() {
            return Vec::new();
        }

        let lower = term.to_lowercase();
        let term_len = lower.chars().count();
        let reason = format!("name starts with '{}'", term);
        let mut found = MatchSet::default();

        for key in self.class_trie.words_with_prefix(&lower) {
            for class in self.classes_lower(&key) {
                let confidence = affix_confidence(term_len, class.name.chars().count());
                found.offer(EntityMatch::for_class(class, MatchType::Prefix, confidence, reason.as_str()));
            }
        }
        for key in self.method_trie.words_with_prefix(&lower) {
            for method in self.methods_lower(&key) {
                let confidence = affix_confidence(term_len, method.name.chars().count());
                found.offer(EntityMatch::for_method(method, MatchType::Prefix, confidence, reason.as_str()));
            }
        }
        for indexed in self.patterns.prefix.get(&lower).into_iter().flatten() {
            let confidence = affix_confidence(term_len, indexed.name.chars().count());
            self.offer_indexed(&mut found, indexed, MatchType::Prefix, confidence, &reason);
        }

        found.into_sorted()
    }

    /// Names ending with `term`, case-insensitive. The suffix index is unioned
    /// with a scan over every name, which also covers suffixes outside the vocabulary.
    pub fn find_by_suffix(&self, term: &str) -> Vec<EntityMatch> {
        let term = term.trim();
        if term.is_empty() {
            return Vec::new();
        }

        let lower = term.to_lowercase();
        let term_len = lower.chars().count();
        let reason = format!("name ends with '{}'", term);
        let mut found = MatchSet::default();

        for indexed in self.patterns.suffix.get(&lower).into_iter().flatten() {
            let confidence = affix_confidence(term_len, indexed.name.chars().count());
            self.offer_indexed(&mut found, indexed, MatchType::Suffix, confidence, &reason);
        }

        for (key, _) in self
            .class_names_by_lower
            .iter()
            .filter(|(key, _)| key.ends_with(&lower))
        {
            for class in self.classes_lower(key) {
                let confidence = affix_confidence(term_len, class.name.chars().count());
                found.offer(EntityMatch::for_class(class, MatchType::Suffix, confidence, reason.as_str()));
            }
        }
        for (key, _) in self
            .method_names_by_lower
            .iter()
            .filter(|(key, _)| key.ends_with(&lower))
        {
            for method in self.methods_lower(key) {
                let confidence = affix_confidence(term_len, method.name.chars().count());
                found.offer(EntityMatch::for_method(method, MatchType::Suffix, confidence, reason.as_str()));
            }
        }

        found.into_sorted()
    }

    /// Class and method names within `max_edit_distance` of `term`, compared lowercase.
    pub fn find_similar(&self, term: &str, max_edit_distance: i32) -> Vec<EntityMatch> {
        let term = term.trim();
        if term.is_empty() || max_edit_distance < 0 {
            return Vec::new();
        }

        let lower = term.to_lowercase();
        let mut found = MatchSet::default();

        for (key, distance) in self.class_tree.search(&lower, max_edit_distance) {
            let confidence = edit_distance_confidence(&lower, key, distance);
            let reason = format!("edit distance {} from '{}'", distance, term);
            for class in self.classes_lower(key) {
                found.offer(EntityMatch::for_class(class, MatchType::Fuzzy, confidence, reason.as_str()));
            }
        }
        for (key, distance) in self.method_tree.search(&lower, max_edit_distance) {
            let confidence = edit_distance_confidence(&lower, key, distance);
            let reason = format!("edit distance {} from '{}'", distance, term);
            for method in self.methods_lower(key) {
                found.offer(EntityMatch::for_method(method, MatchType::Fuzzy, confidence, reason.as_str()));
            }
        }

        found.into_sorted()
    }

    /// Join `terms` as camelCase, PascalCase and snake_case and look each up exactly,
    /// then consult the compound index for names containing the same token run.
    pub fn find_by_compound<S: AsRef<str>>(&self, terms: &[S]) -> Vec<EntityMatch> {
        let parts: Vec<String> = terms
            .iter()
            .flat_map(|t| split_identifier(t.as_ref()))
            .collect();
        if parts.is_empty() {
            return Vec::new();
        }

        let mut found = MatchSet::default();
        let candidates: BTreeSet<String> = [
            to_camel_case(&parts),
            to_pascal_case(&parts),
            to_snake_case(&parts),
        ]
        .into_iter()
        .collect();

        for candidate in &candidates {
            let reason = format!("compound name '{}'", candidate);
            for class in self.classes_named(candidate) {
                found.offer(EntityMatch::for_class(
                    class,
                    MatchType::Pattern,
                    COMPOUND_NAME_CONFIDENCE,
                    reason.as_str(),
                ));
            }
            for method in self.methods_named(candidate) {
                found.offer(EntityMatch::for_method(
                    method,
                    MatchType::Pattern,
                    COMPOUND_NAME_CONFIDENCE,
                    reason.as_str(),
                ));
            }
        }

        let key = to_snake_case(&parts);
        let reason = format!("name contains terms '{}'", parts.join(" "));
        for indexed in self.patterns.compound.get(&key).into_iter().flatten() {
            self.offer_indexed(
                &mut found,
                indexed,
                MatchType::Pattern,
                COMPOUND_INDEX_CONFIDENCE,
                &reason,
            );
        }

        found.into_sorted()
    }

    /// Names whose tokens share Soundex codes with the tokens of `term`.
    pub fn find_phonetic(&self, term: &str) -> Vec<EntityMatch> {
        let tokens = split_identifier(term);
        let Some(key) = phonetic_key(&tokens) else {
            return Vec::new();
        };

        let reason = format!("sounds like '{}'", term.trim());
        let mut found = MatchSet::default();
        for indexed in self.patterns.phonetic.get(&key).into_iter().flatten() {
            self.offer_indexed(
                &mut found,
                indexed,
                MatchType::Phonetic,
                PHONETIC_CONFIDENCE,
                &reason,
            );
        }
        found.into_sorted()
    }

    /// Multi-token names whose token initials spell `abbreviation` (`ucs` -> `UserCreationService`).
    pub fn find_by_abbreviation(&self, abbreviation: &str) -> Vec<EntityMatch> {
        let lower = abbreviation.trim().to_lowercase();
        if lower.chars().count() < 2 || !lower.chars().all(char::is_alphanumeric) {
            return Vec::new();
        }

        let reason = format!("initials match '{}'", abbreviation.trim());
        let mut found = MatchSet::default();
        for indexed in self.patterns.abbreviation.get(&lower).into_iter().flatten() {
            self.offer_indexed(
                &mut found,
                indexed,
                MatchType::Abbreviation,
                ABBREVIATION_CONFIDENCE,
                &reason,
            );
        }
        found.into_sorted()
    }
}

fn convert_records<R, E>(
    records: Vec<R>,
    kind: &'static str,
    skipped: &mut usize,
    is_valid: impl Fn(&R) -> bool,
    describe: impl Fn(&R) -> String,
    build: impl Fn(R) -> E,
) -> Vec<Arc<E>> {
    let mut out = Vec::with_capacity(records.len());
    let mut rejected = 0usize;
    for record in records {
        if is_valid(&record) {
            out.push(Arc::new(build(record)));
        } else {
            debug!(kind, record = %describe(&record), "skipping record with blank id or name");
            rejected += 1;
        }
    }
    if rejected > 0 {
        warn!(kind, rejected, "skipped malformed records");
    }
    *skipped += rejected;
    out
}

pub(crate) fn classes_from_records(
    records: Vec<ClassRecord>,
    vocabulary: &Vocabulary,
    skipped: &mut usize,
) -> Vec<Arc<ClassEntity>> {
    convert_records(
        records,
        "class",
        skipped,
        ClassRecord::is_valid,
        |r| format!("id={:?} name={:?}", r.id, r.name),
        |r| ClassEntity::from_record(r, vocabulary),
    )
}

pub(crate) fn methods_from_records(
    records: Vec<MethodRecord>,
    vocabulary: &Vocabulary,
    skipped: &mut usize,
) -> Vec<Arc<MethodEntity>> {
    convert_records(
        records,
        "method",
        skipped,
        MethodRecord::is_valid,
        |r| format!("id={:?} name={:?}", r.id, r.name),
        |r| MethodEntity::from_record(r, vocabulary),
    )
}

pub(crate) fn packages_from_records(
    records: Vec<PackageRecord>,
    skipped: &mut usize,
) -> Vec<Arc<PackageEntity>> {
    convert_records(
        records,
        "package",
        skipped,
        PackageRecord::is_valid,
        |r| format!("name={:?}", r.name),
        PackageEntity::from,
    )
}
