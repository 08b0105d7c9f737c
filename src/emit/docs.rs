//! XML documentation output.
//!
//! Every documented type, field and method contributes one `<member>` element whose
//! `name` is its documentation id. A comment that is not well-formed XML is replaced
//! by an XML comment and reported as a warning; the rest of the file is still written.

use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Reader, Writer,
};

use crate::{
    diagnostics::{DiagnosticBag, ErrorCode, Location},
    emit::{builder::ModuleBuilder, OutputStream},
    symbols::SyntaxReference,
    utils::CancellationToken,
    Result,
};

/// Writes the documentation file for `module` to `out`.
pub(crate) fn write_documentation(
    module: &ModuleBuilder,
    out: &mut dyn OutputStream,
    diagnostics: &DiagnosticBag,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
    let xml_error = |e: std::io::Error| malformed_error!("failed to write documentation: {}", e);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", None, None)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Start(BytesStart::new("doc")))
        .map_err(xml_error)?;
    for event in [
        Event::Start(BytesStart::new("assembly")),
        Event::Start(BytesStart::new("name")),
        Event::Text(BytesText::new(module.identity.name())),
        Event::End(BytesEnd::new("name")),
        Event::End(BytesEnd::new("assembly")),
    ] {
        writer.write_event(event).map_err(xml_error)?;
    }
    writer
        .write_event(Event::Start(BytesStart::new("members")))
        .map_err(xml_error)?;

    for ty in &module.types {
        check_cancelled!(cancel);
        let type_syntax = ty.symbol.declaring_syntax().first();
        write_member(
            &mut writer,
            &format!("T:{}", ty.symbol.full_metadata_name()),
            ty.symbol.documentation(),
            type_syntax,
            diagnostics,
        )?;
        for field in &ty.fields {
            write_member(
                &mut writer,
                &format!("F:{}", field.qualified_name()),
                field.documentation(),
                field.declaring_syntax(),
                diagnostics,
            )?;
        }
        for method in &ty.methods {
            write_member(
                &mut writer,
                &method.symbol.documentation_id(),
                method.symbol.documentation(),
                method.symbol.declaring_syntax(),
                diagnostics,
            )?;
        }
    }

    writer
        .write_event(Event::End(BytesEnd::new("members")))
        .map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new("doc")))
        .map_err(xml_error)?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    out.write_all(&bytes)
}

fn write_member(
    writer: &mut Writer<Vec<u8>>,
    id: &str,
    documentation: Option<&str>,
    syntax: Option<&SyntaxReference>,
    diagnostics: &DiagnosticBag,
) -> Result<()> {
    let Some(text) = documentation.filter(|d| !d.trim().is_empty()) else {
        return Ok(());
    };
    let xml_error = |e: std::io::Error| malformed_error!("failed to write documentation: {}", e);

    if let Err(reason) = check_well_formed(text) {
        log::debug!("documentation for {} is not well-formed: {}", id, reason);
        let location = syntax
            .map(|s| Location::source(&s.tree, s.node.span()))
            .unwrap_or_default();
        diagnostics.add(ErrorCode::BadXmlDocComment.diagnostic(location, &[&reason]));
        writer
            .write_event(Event::Comment(BytesText::new(&format!(
                " Badly formed XML comment ignored for member \"{id}\" "
            ))))
            .map_err(xml_error)?;
        return Ok(());
    }

    writer
        .write_event(Event::Start(BytesStart::new("member").with_attributes([("name", id)])))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Text(BytesText::from_escaped(text.trim())))
        .map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new("member")))
        .map_err(xml_error)?;
    Ok(())
}

/// Parses `fragment` as the content of an element.
fn check_well_formed(fragment: &str) -> std::result::Result<(), String> {
    let wrapped = format!("<member>{fragment}</member>");
    let mut reader = Reader::from_str(&wrapped);
    let mut depth = 0usize;
    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) => depth += 1,
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Text(text)) => {
                text.unescape().map_err(|e| e.to_string())?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
    }
    if depth == 0 {
        Ok(())
    } else {
        Err("unexpected end of comment".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emit::MemoryStream,
        lang::MiniLanguage,
        options::{CompilationOptions, EmitOptions, OutputKind},
        references::{AssemblyMetadata, MetadataReference},
    };

    fn module(source: &str) -> ModuleBuilder {
        let compilation = MiniLanguage::create_compilation(
            Some("Docs"),
            [MiniLanguage::parse(source, "a.mini")],
            [MetadataReference::from_metadata(AssemblyMetadata::core_library(), None)],
            CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary),
        )
        .unwrap();
        ModuleBuilder::new(&compilation, EmitOptions::default(), &CancellationToken::none()).unwrap()
    }

    fn render(module: &ModuleBuilder, bag: &DiagnosticBag) -> String {
        let mut out = MemoryStream::new();
        write_documentation(module, &mut out, bag, &CancellationToken::none()).unwrap();
        String::from_utf8(out.into_inner()).unwrap()
    }

    #[test]
    fn test_documented_members_are_written() {
        let module = module(
            "/// <summary>A type</summary>\npublic class C {\n/// <summary>Runs</summary>\npublic void Run() {} }",
        );
        let bag = DiagnosticBag::new();
        let xml = render(&module, &bag);
        assert!(xml.starts_with("<?xml version=\"1.0\"?>"));
        assert!(xml.contains("<name>Docs</name>"));
        assert!(xml.contains("<member name=\"T:C\">"));
        assert!(xml.contains("<member name=\"M:C.Run\">"));
        assert!(xml.contains("<summary>Runs</summary>"));
        assert!(bag.iter().next().is_none());
    }

    #[test]
    fn test_badly_formed_comment_is_reported() {
        let module = module("/// <summary>Broken\npublic class C {}");
        let bag = DiagnosticBag::new();
        let xml = render(&module, &bag);
        assert!(xml.contains("Badly formed XML comment ignored"));
        assert!(!xml.contains("<member name=\"T:C\">"));
        assert_eq!(bag.iter().next().unwrap().id(), ErrorCode::BadXmlDocComment.id());
    }

    #[test]
    fn test_well_formed_check() {
        assert!(check_well_formed("<a>x</a>").is_ok());
        assert!(check_well_formed("plain &amp; text").is_ok());
        assert!(check_well_formed("<a>x</b>").is_err());
        assert!(check_well_formed("<a>").is_err());
    }
}
