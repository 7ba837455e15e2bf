//! XML rule file format
//!
//! A rule file is an `<xml>` document whose top-level `<block>` elements
//! are rules. Inside a block, `<mutation>` carries the shape metadata,
//! `<field>` holds literal text, `<value>` and `<statement>` hold child
//! blocks and `<next>` continues a statement chain.
//!
//! Whitespace between elements, comments and unknown elements are dropped
//! on read. Field text is unescaped on read and escaped on write.

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use rules_hub_core::{Block, InputKind, Mutation, Position};
use std::fmt::Display;

use crate::{escape, unescape, CodecError};

pub const BLOCKLY_NAMESPACE: &str = "https://developers.google.com/blockly/xml";

fn xml_error(err: impl Display) -> CodecError {
    CodecError::Xml(err.to_string())
}

/// Top-level blocks of an XML document, in document order
pub fn parse_blocks(text: &str) -> Result<Vec<Block>, CodecError> {
    let mut reader = Reader::from_str(text);
    let mut blocks = Vec::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match e.name().as_ref() {
                b"xml" => {}
                b"block" | b"shadow" => blocks.push(parse_block(&mut reader, &e)?),
                _ => skip(&mut reader, &e)?,
            },
            Event::Empty(e) => {
                if matches!(e.name().as_ref(), b"block" | b"shadow") {
                    blocks.push(block_header(&e)?);
                }
            }
            Event::Text(t) => ensure_blank(&t)?,
            Event::Eof => break,
            _ => {}
        }
    }
    tracing::debug!("Parsed {} top-level blocks", blocks.len());
    Ok(blocks)
}

fn parse_block(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<Block, CodecError> {
    let mut block = block_header(start)?;
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match e.name().as_ref() {
                b"mutation" => {
                    block.mutation = Some(Mutation::from_attributes(attributes(&e)?));
                    skip(reader, &e)?;
                }
                b"field" => {
                    let name = required_attribute(&e, "name")?;
                    let text = read_text(reader, &e)?;
                    block.set_field(name, unescape(&text));
                }
                b"value" => {
                    let name = required_attribute(&e, "name")?;
                    let child = parse_slot(reader)?;
                    block.set_input(name, InputKind::Value, child);
                }
                b"statement" => {
                    let name = required_attribute(&e, "name")?;
                    let child = parse_slot(reader)?;
                    block.set_input(name, InputKind::Statement, child);
                }
                b"next" => block.next = parse_slot(reader)?.map(Box::new),
                _ => skip(reader, &e)?,
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"mutation" => block.mutation = Some(Mutation::from_attributes(attributes(&e)?)),
                b"field" => block.set_field(required_attribute(&e, "name")?, ""),
                b"value" => {
                    block.set_input(required_attribute(&e, "name")?, InputKind::Value, None)
                }
                b"statement" => {
                    block.set_input(required_attribute(&e, "name")?, InputKind::Statement, None)
                }
                _ => {}
            },
            Event::End(_) => return Ok(block),
            Event::Text(t) => ensure_blank(&t)?,
            Event::Eof => {
                return Err(CodecError::Xml(format!(
                    "unterminated block {}",
                    block.block_type
                )))
            }
            _ => {}
        }
    }
}

/// Content of a `<value>`, `<statement>` or `<next>` element
///
/// A real block wins over a shadow block in the same slot.
fn parse_slot(reader: &mut Reader<&[u8]>) -> Result<Option<Block>, CodecError> {
    let mut child: Option<Block> = None;
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match e.name().as_ref() {
                b"block" => child = Some(parse_block(reader, &e)?),
                b"shadow" => {
                    let shadow = parse_block(reader, &e)?;
                    child.get_or_insert(shadow);
                }
                _ => skip(reader, &e)?,
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"block" => child = Some(block_header(&e)?),
                b"shadow" => {
                    let shadow = block_header(&e)?;
                    child.get_or_insert(shadow);
                }
                _ => {}
            },
            Event::End(_) => return Ok(child),
            Event::Text(t) => ensure_blank(&t)?,
            Event::Eof => return Err(CodecError::Xml("unterminated slot".to_string())),
            _ => {}
        }
    }
}

fn block_header(start: &BytesStart) -> Result<Block, CodecError> {
    let mut block = Block::of_type(required_attribute(start, "type")?);
    let mut x = None;
    let mut y = None;
    for (key, value) in attributes(start)? {
        match key.as_str() {
            "id" => block.id = Some(value),
            "x" => x = value.trim().parse::<i64>().ok(),
            "y" => y = value.trim().parse::<i64>().ok(),
            _ => {}
        }
    }
    if let (Some(x), Some(y)) = (x, y) {
        block.position = Some(Position { x, y });
    }
    Ok(block)
}

/// Raw text of a `<field>` element, up to its end tag
fn read_text(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<String, CodecError> {
    let mut text = String::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Text(t) => text.push_str(&t.unescape().map_err(xml_error)?),
            Event::CData(c) => text.push_str(std::str::from_utf8(&c).map_err(xml_error)?),
            Event::End(_) => return Ok(text),
            Event::Start(e) | Event::Empty(e) => {
                return Err(CodecError::Xml(format!(
                    "unexpected <{}> inside <{}>",
                    String::from_utf8_lossy(e.name().as_ref()),
                    String::from_utf8_lossy(start.name().as_ref())
                )))
            }
            Event::Eof => return Err(CodecError::Xml("unterminated field".to_string())),
            _ => {}
        }
    }
}

fn skip(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<(), CodecError> {
    reader.read_to_end(start.name()).map_err(xml_error)?;
    Ok(())
}

fn ensure_blank(text: &BytesText) -> Result<(), CodecError> {
    let text = text.unescape().map_err(xml_error)?;
    if text.trim().is_empty() {
        Ok(())
    } else {
        Err(CodecError::Xml(format!("unexpected text '{}'", text.trim())))
    }
}

fn attributes(start: &BytesStart) -> Result<Vec<(String, String)>, CodecError> {
    start
        .attributes()
        .map(|attr| {
            let attr = attr.map_err(xml_error)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(xml_error)?.into_owned();
            Ok((key, value))
        })
        .collect()
}

fn required_attribute(start: &BytesStart, name: &'static str) -> Result<String, CodecError> {
    attributes(start)?
        .into_iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value)
        .ok_or_else(|| CodecError::MissingAttribute {
            element: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attribute: name,
        })
}

/// Serialize blocks as an `<xml>` document
///
/// Inputs with no connected block are omitted; readers recreate them from
/// the block's shape.
pub fn write_blocks(blocks: &[Block]) -> Result<String, CodecError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    let root = BytesStart::new("xml").with_attributes([("xmlns", BLOCKLY_NAMESPACE)]);
    writer.write_event(Event::Start(root.borrow())).map_err(xml_error)?;
    for block in blocks {
        write_block(&mut writer, block)?;
    }
    writer.write_event(Event::End(root.to_end())).map_err(xml_error)?;
    String::from_utf8(writer.into_inner()).map_err(xml_error)
}

fn write_block(writer: &mut Writer<Vec<u8>>, block: &Block) -> Result<(), CodecError> {
    let mut start = BytesStart::new("block");
    start.push_attribute(("type", block.block_type.as_str()));
    if let Some(id) = &block.id {
        start.push_attribute(("id", id.as_str()));
    }
    if let Some(position) = block.position {
        start.push_attribute(("x", position.x.to_string().as_str()));
        start.push_attribute(("y", position.y.to_string().as_str()));
    }
    writer.write_event(Event::Start(start.borrow())).map_err(xml_error)?;

    if let Some(mutation) = block.mutation.as_ref().filter(|m| !m.is_empty()) {
        let mut element = BytesStart::new("mutation");
        for (key, value) in mutation.to_attributes() {
            element.push_attribute((key.as_str(), value.as_str()));
        }
        writer.write_event(Event::Empty(element)).map_err(xml_error)?;
    }

    for field in &block.fields {
        let element = BytesStart::new("field").with_attributes([("name", field.name.as_str())]);
        if field.value.is_empty() {
            writer.write_event(Event::Empty(element)).map_err(xml_error)?;
            continue;
        }
        writer.write_event(Event::Start(element.borrow())).map_err(xml_error)?;
        writer
            .write_event(Event::Text(BytesText::new(&escape(&field.value))))
            .map_err(xml_error)?;
        writer.write_event(Event::End(element.to_end())).map_err(xml_error)?;
    }

    for input in &block.inputs {
        let Some(child) = input.block.as_deref() else {
            continue;
        };
        let tag = match input.kind {
            InputKind::Value => "value",
            InputKind::Statement => "statement",
        };
        let element = BytesStart::new(tag).with_attributes([("name", input.name.as_str())]);
        writer.write_event(Event::Start(element.borrow())).map_err(xml_error)?;
        write_block(writer, child)?;
        writer.write_event(Event::End(element.to_end())).map_err(xml_error)?;
    }

    if let Some(next) = block.next.as_deref() {
        let element = BytesStart::new("next");
        writer.write_event(Event::Start(element.borrow())).map_err(xml_error)?;
        write_block(writer, next)?;
        writer.write_event(Event::End(element.to_end())).map_err(xml_error)?;
    }

    writer.write_event(Event::End(start.to_end())).map_err(xml_error)?;
    Ok(())
}
