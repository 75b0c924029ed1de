//! Reproducible byte layout for rendered sheets.
//!
//! The document engine names page resources and numbers objects in whatever order its internal
//! maps yield them, adds an XMP metadata stream and writes a trailer `/ID` of its own. Two
//! renders of the same table would therefore differ in bytes although they draw the same pages.
//! [`canonicalize`] rewrites a loaded document so that its serialization depends only on what
//! is drawn and on the information dictionary:
//!
//! - the catalog `/Metadata` stream is dropped
//! - page resources are renamed `F1`, `X1`, ... in order of first use in the content streams
//! - font subset tags (`ABCDEF+Name`) are replaced by sequential tags
//! - `ToUnicode` mappings are sorted
//! - objects are renumbered in traversal order from the trailer, dictionary keys sorted
//! - the trailer `/ID` is a digest of the information dictionary and the page contents

use std::collections::{BTreeMap, VecDeque};

use log::debug;
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use sha2::{Digest, Sha256};

/// Resource categories that content operators refer to by name, with the prefix of their
/// canonical names.
const RESOURCE_CATEGORIES: [(&[u8], &str); 7] = [
    (b"Font", "F"),
    (b"XObject", "X"),
    (b"ExtGState", "GS"),
    (b"Shading", "Sh"),
    (b"ColorSpace", "CS"),
    (b"Pattern", "P"),
    (b"Properties", "MC"),
];

/// Resource category an operator's name operands refer to.
fn operator_category(operator: &str) -> Option<&'static [u8]> {
    match operator {
        "Tf" => Some(&b"Font"[..]),
        "Do" => Some(&b"XObject"[..]),
        "gs" => Some(&b"ExtGState"[..]),
        "sh" => Some(&b"Shading"[..]),
        "cs" | "CS" => Some(&b"ColorSpace"[..]),
        "scn" | "SCN" => Some(&b"Pattern"[..]),
        "BDC" | "DP" => Some(&b"Properties"[..]),
        _ => None,
    }
}

fn category_prefix(category: &[u8]) -> &'static str {
    RESOURCE_CATEGORIES
        .iter()
        .find(|(name, _)| *name == category)
        .map_or("R", |(_, prefix)| *prefix)
}

/// Where a page's resource dictionary lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ResourceHolder {
    /// Inline in the page dictionary.
    Page(ObjectId),
    /// An indirect object, possibly shared between pages.
    Shared(ObjectId),
}

/// Old-to-new resource names of one resource dictionary, per category, in order of first use.
#[derive(Debug, Default)]
struct Renames {
    names: BTreeMap<Vec<u8>, Vec<(Vec<u8>, Vec<u8>)>>,
}

impl Renames {
    fn rename(&mut self, category: &[u8], old: &[u8]) -> Vec<u8> {
        let entries = self.names.entry(category.to_vec()).or_default();
        if let Some((_, new)) = entries.iter().find(|(o, _)| o == old) {
            return new.clone();
        }
        let new = format!("{}{}", category_prefix(category), entries.len() + 1).into_bytes();
        entries.push((old.to_vec(), new.clone()));
        new
    }
}

/// Rewrites `doc` in place into its reproducible form and sets its trailer `/ID`.
pub fn canonicalize(doc: &mut Document) -> lopdf::Result<()> {
    drop_xmp_metadata(doc)?;
    let contents = rename_page_resources(doc)?;
    sort_unicode_maps(doc);
    renumber(doc);

    let id = document_id(doc, &contents);
    doc.trailer.set(
        "ID",
        Object::Array(vec![
            Object::String(id.clone(), StringFormat::Hexadecimal),
            Object::String(id, StringFormat::Hexadecimal),
        ]),
    );
    doc.compress();
    Ok(())
}

fn drop_xmp_metadata(doc: &mut Document) -> lopdf::Result<()> {
    let root = doc.trailer.get(b"Root")?.as_reference()?;
    if doc.get_dictionary_mut(root)?.remove(b"Metadata").is_some() {
        debug!("Dropped the XMP metadata stream");
    }
    Ok(())
}

fn resolve_dictionary(doc: &Document, object: &Object) -> Option<Dictionary> {
    match object {
        Object::Dictionary(dict) => Some(dict.clone()),
        Object::Reference(id) => doc.get_dictionary(*id).ok().cloned(),
        _ => None,
    }
}

/// Category dictionaries of a resource dictionary, indirect ones resolved.
fn resource_categories(doc: &Document, resources: &Dictionary) -> BTreeMap<Vec<u8>, Dictionary> {
    RESOURCE_CATEGORIES
        .iter()
        .filter_map(|(category, _)| {
            let entries = resolve_dictionary(doc, resources.get(category).ok()?)?;
            Some((category.to_vec(), entries))
        })
        .collect()
}

/// Index of the operand that names a resource.
fn resource_operand(operator: &str, operands: usize) -> Option<usize> {
    match operator {
        "scn" | "SCN" => operands.checked_sub(1),
        "BDC" | "DP" => Some(1),
        _ => Some(0),
    }
}

/// Renames the resources of every page and replaces its content with one stream that uses the
/// new names. Returns the new content of every page, in page order.
fn rename_page_resources(doc: &mut Document) -> lopdf::Result<Vec<Vec<u8>>> {
    let mut renames: BTreeMap<ResourceHolder, Renames> = BTreeMap::new();
    let mut contents = Vec::new();

    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    for page_id in pages {
        let (holder, resources) = match doc.get_dictionary(page_id)?.get(b"Resources") {
            Ok(Object::Reference(id)) => (
                Some(ResourceHolder::Shared(*id)),
                doc.get_dictionary(*id).ok(),
            ),
            Ok(Object::Dictionary(dict)) => (Some(ResourceHolder::Page(page_id)), Some(dict)),
            _ => (None, None),
        };
        let available = resources
            .map(|r| resource_categories(doc, r))
            .unwrap_or_default();

        let mut content = Content::decode(&doc.get_page_content(page_id)?)?;
        if let Some(holder) = holder {
            let page_renames = renames.entry(holder).or_default();
            for operation in &mut content.operations {
                let Some(category) = operator_category(&operation.operator) else {
                    continue;
                };
                let Some(entries) = available.get(category) else {
                    continue;
                };
                let Some(index) =
                    resource_operand(&operation.operator, operation.operands.len())
                else {
                    continue;
                };
                let Some(Object::Name(name)) = operation.operands.get_mut(index) else {
                    continue;
                };
                if entries.has(name.as_slice()) {
                    let new = page_renames.rename(category, name.as_slice());
                    *name = new;
                }
            }
        }

        let bytes = content.encode()?;
        let stream_id = doc.add_object(Stream::new(Dictionary::new(), bytes.clone()));
        doc.get_dictionary_mut(page_id)?
            .set("Contents", Object::Reference(stream_id));
        contents.push(bytes);
    }

    for (holder, page_renames) in renames {
        let resources = match holder {
            ResourceHolder::Page(page_id) => doc.get_dictionary(page_id)?.get(b"Resources")?,
            ResourceHolder::Shared(id) => doc.get_object(id)?,
        };
        let Some(old) = resolve_dictionary(doc, resources) else {
            continue;
        };
        let resources = rename_resources(doc, &old, &page_renames);
        match holder {
            ResourceHolder::Page(page_id) => {
                doc.get_dictionary_mut(page_id)?
                    .set("Resources", Object::Dictionary(resources));
            }
            ResourceHolder::Shared(id) => {
                doc.objects.insert(id, Object::Dictionary(resources));
            }
        }
    }

    Ok(contents)
}

/// Rebuilds a resource dictionary under the new names. Resources no content stream uses are
/// left out.
fn rename_resources(doc: &Document, old: &Dictionary, renames: &Renames) -> Dictionary {
    let mut resources = old.clone();
    for (category, entries) in resource_categories(doc, old) {
        let mut renamed = Dictionary::new();
        for (old_name, new_name) in renames.names.get(&category).into_iter().flatten() {
            if let Ok(value) = entries.get(old_name) {
                renamed.set(new_name.clone(), value.clone());
            }
        }
        resources.set(category, Object::Dictionary(renamed));
    }
    resources
}

/// Sorts the mapping lines inside every `bfchar`/`bfrange` block of the `ToUnicode` streams.
fn sort_unicode_maps(doc: &mut Document) {
    let targets: Vec<ObjectId> = doc
        .objects
        .values()
        .filter_map(|object| match object {
            Object::Dictionary(dict) => dict.get(b"ToUnicode").ok()?.as_reference().ok(),
            _ => None,
        })
        .collect();

    for id in targets {
        let Ok(Object::Stream(stream)) = doc.get_object_mut(id) else {
            continue;
        };
        let bytes = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        let Ok(text) = String::from_utf8(bytes) else {
            continue;
        };
        stream.dict.remove(b"Filter");
        stream.set_content(sort_cmap_blocks(&text).into_bytes());
    }
}

fn sort_cmap_blocks(cmap: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    let mut in_block = false;
    for line in cmap.lines() {
        let trimmed = line.trim();
        if !in_block {
            out.push(line);
            in_block = trimmed.ends_with("beginbfchar") || trimmed.ends_with("beginbfrange");
        } else if trimmed == "endbfchar" || trimmed == "endbfrange" {
            block.sort_unstable();
            out.append(&mut block);
            out.push(line);
            in_block = false;
        } else {
            block.push(line);
        }
    }
    out.append(&mut block);
    let mut text = out.join("\n");
    text.push('\n');
    text
}

fn sorted_entries(dict: &Dictionary) -> Vec<(&Vec<u8>, &Object)> {
    let mut entries: Vec<_> = dict.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

fn collect_references(object: &Object, out: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => out.push(*id),
        Object::Array(items) => items.iter().for_each(|o| collect_references(o, out)),
        Object::Dictionary(dict) => sorted_entries(dict)
            .into_iter()
            .for_each(|(_, o)| collect_references(o, out)),
        Object::Stream(stream) => sorted_entries(&stream.dict)
            .into_iter()
            .for_each(|(_, o)| collect_references(o, out)),
        _ => {}
    }
}

/// Subset tags in order of appearance, replaced by `AAAAAA`, `AAAAAB`, ...
#[derive(Debug, Default)]
struct SubsetTags {
    seen: Vec<Vec<u8>>,
}

impl SubsetTags {
    fn replace(&mut self, name: &[u8]) -> Vec<u8> {
        let is_tagged = name.len() > 7
            && name[6] == b'+'
            && name[..6].iter().all(|c| c.is_ascii_uppercase());
        if !is_tagged {
            return name.to_vec();
        }
        let tag = name[..6].to_vec();
        let position = match self.seen.iter().position(|t| *t == tag) {
            Some(p) => p,
            None => {
                self.seen.push(tag);
                self.seen.len() - 1
            }
        };
        let mut new = [b'A'; 6];
        let mut rest = position;
        for slot in new.iter_mut().rev() {
            *slot = b'A' + (rest % 26) as u8;
            rest /= 26;
        }
        let mut out = new.to_vec();
        out.extend_from_slice(&name[6..]);
        out
    }
}

struct Rewriter<'a> {
    ids: &'a BTreeMap<ObjectId, ObjectId>,
    tags: SubsetTags,
}

impl Rewriter<'_> {
    fn object(&mut self, object: &Object) -> Object {
        match object {
            // Dangling references become null
            Object::Reference(id) => self
                .ids
                .get(id)
                .map_or(Object::Null, |new| Object::Reference(*new)),
            Object::Array(items) => Object::Array(items.iter().map(|o| self.object(o)).collect()),
            Object::Dictionary(dict) => Object::Dictionary(self.dictionary(dict)),
            Object::Stream(stream) => {
                let mut stream = stream.clone();
                stream.dict = self.dictionary(&stream.dict);
                Object::Stream(stream)
            }
            other => other.clone(),
        }
    }

    fn dictionary(&mut self, dict: &Dictionary) -> Dictionary {
        let mut out = Dictionary::new();
        for (key, value) in sorted_entries(dict) {
            let value = match (key.as_slice(), value) {
                (b"BaseFont" | b"FontName", Object::Name(name)) => {
                    Object::Name(self.tags.replace(name))
                }
                _ => self.object(value),
            };
            out.set(key.clone(), value);
        }
        out
    }
}

/// Renumbers the objects reachable from the trailer's `Root` and `Info` in breadth-first order,
/// dropping everything else.
fn renumber(doc: &mut Document) {
    let mut ids: BTreeMap<ObjectId, ObjectId> = BTreeMap::new();
    let mut order = Vec::new();
    let mut queue = VecDeque::new();

    let roots: Vec<ObjectId> = [&b"Root"[..], &b"Info"[..]]
        .iter()
        .filter_map(|key| doc.trailer.get(key).ok()?.as_reference().ok())
        .collect();
    let mut pending = roots;
    while !pending.is_empty() || !queue.is_empty() {
        for id in pending.drain(..) {
            if !ids.contains_key(&id) && doc.objects.contains_key(&id) {
                let new = (ids.len() as u32 + 1, 0);
                ids.insert(id, new);
                order.push(id);
                queue.push_back(id);
            }
        }
        if let Some(id) = queue.pop_front() {
            if let Some(object) = doc.objects.get(&id) {
                collect_references(object, &mut pending);
            }
        }
    }

    let mut rewriter = Rewriter {
        ids: &ids,
        tags: SubsetTags::default(),
    };
    let mut objects = BTreeMap::new();
    for old in &order {
        if let (Some(object), Some(new)) = (doc.objects.get(old), ids.get(old)) {
            objects.insert(*new, rewriter.object(object));
        }
    }

    let mut trailer = Dictionary::new();
    for key in [&b"Info"[..], &b"Root"[..]] {
        if let Ok(Object::Reference(id)) = doc.trailer.get(key) {
            if let Some(new) = ids.get(id) {
                trailer.set(key.to_vec(), Object::Reference(*new));
            }
        }
    }

    debug!(
        "Renumbered {} of {} objects",
        objects.len(),
        doc.objects.len()
    );
    doc.max_id = objects.len() as u32;
    doc.objects = objects;
    doc.trailer = trailer;
}

/// First 16 bytes of the SHA-256 of the information dictionary and the page contents.
fn document_id(doc: &Document, contents: &[Vec<u8>]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    let info = doc
        .trailer
        .get(b"Info")
        .and_then(Object::as_reference)
        .and_then(|id| doc.get_dictionary(id));
    if let Ok(info) = info {
        for (key, value) in sorted_entries(info) {
            hasher.update(key);
            if let Object::String(bytes, _) | Object::Name(bytes) = value {
                hasher.update(bytes);
            }
        }
    }
    for content in contents {
        hasher.update(content);
    }
    hasher.finalize()[..16].to_vec()
}
