//! Wire compatibility between the encodings.
//!
//! A record set encoded compact, merged and transcoded must decode to the
//! same fields as the same set encoded full at the source.

use meshflow_core::{Encoding, MeshAddress};
use meshflow_ipfix::{
    decode_message, encode_message, source_tag_spec, transcode, write_unsigned, AggregationBuffer,
    CompactMessage, ExportBuffer, ExportContext, InformationElement, MessageKind, MessageWriter,
    Template, MESHFLOW_ENTERPRISE_ID,
};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Report {
    node: u16,
    octets: u64,
}

fn template() -> Template<Report> {
    Template::new(256)
        .unwrap()
        .with_element(Arc::new(
            InformationElement::new(
                32770,
                2,
                MESHFLOW_ENTERPRISE_ID,
                |r: &Report, out: &mut [u8]| write_unsigned(r.node as u64, out),
            )
            .unwrap(),
        ))
        .unwrap()
        .with_element(Arc::new(
            InformationElement::new(1, 4, 0, |r: &Report, out: &mut [u8]| {
                write_unsigned(r.octets, out)
            })
            .unwrap(),
        ))
        .unwrap()
}

fn encode(encoding: Encoding, kind: MessageKind, reports: &[Report]) -> Vec<u8> {
    let mut buf = ExportBuffer::with_capacity(1280);
    let mut ctx = ExportContext::new(1);
    encode_message(&mut buf, &mut ctx, encoding, kind, 100, &template(), reports)
        .unwrap()
        .to_vec()
}

#[test]
fn test_compact_transcode_matches_full_encoding() {
    let reports = vec![
        Report { node: 1, octets: 10 },
        Report { node: 2, octets: 20 },
    ];
    let full = decode_message(&encode(Encoding::Full, MessageKind::Data, &reports)).unwrap();

    let compact = encode(Encoding::Compact, MessageKind::Data, &reports);
    let mut buf = ExportBuffer::with_capacity(1280);
    let mut ctx = ExportContext::new(1);
    let message = CompactMessage::parse(&compact).unwrap();
    let transcoded = transcode(&message, &mut buf, &mut ctx, 100, None).unwrap();
    let expanded = decode_message(transcoded).unwrap();

    assert_eq!(full.sets, expanded.sets);
}

#[test]
fn test_compact_template_transcodes_to_full_template() {
    let full = decode_message(&encode(Encoding::Full, MessageKind::Template, &[])).unwrap();
    let compact = encode(Encoding::Compact, MessageKind::Template, &[]);

    let mut buf = ExportBuffer::with_capacity(1280);
    let mut ctx = ExportContext::new(1);
    let message = CompactMessage::parse(&compact).unwrap();
    let expanded = decode_message(transcode(&message, &mut buf, &mut ctx, 100, None).unwrap()).unwrap();

    assert_eq!(full.sets, expanded.sets);
    let template = expanded.templates().next().unwrap();
    assert_eq!(template.fields[0].enterprise_id, MESHFLOW_ENTERPRISE_ID);
}

#[test]
fn test_merge_then_transcode_keeps_every_record() {
    let children = [
        vec![Report { node: 1, octets: 5 }],
        vec![Report { node: 2, octets: 6 }, Report { node: 3, octets: 7 }],
        vec![Report { node: 4, octets: 8 }],
    ];
    let mut aggregation = AggregationBuffer::new(4, 1280);
    for reports in &children {
        let bytes = encode(Encoding::Compact, MessageKind::Data, reports);
        aggregation.merge(&CompactMessage::parse(&bytes).unwrap()).unwrap();
    }
    assert_eq!(aggregation.record_count(), 4);

    let mut merged = ExportBuffer::with_capacity(1280);
    let mut ctx = ExportContext::new(1);
    let mut writer =
        MessageWriter::begin(&mut merged, &mut ctx, Encoding::Compact, MessageKind::Data, 0)
            .unwrap();
    aggregation.write_data(&mut writer).unwrap();
    let merged = writer.finish().unwrap();

    let sender: MeshAddress = "fd00::a".parse().unwrap();
    let mut out = ExportBuffer::with_capacity(1280);
    let message = CompactMessage::parse(merged).unwrap();
    let full = decode_message(transcode(&message, &mut out, &mut ctx, 0, Some(sender)).unwrap()).unwrap();

    let mut definition = decode_message(&encode(Encoding::Full, MessageKind::Template, &[]))
        .unwrap()
        .templates()
        .next()
        .unwrap()
        .clone();
    definition.fields.push(source_tag_spec());

    let body = full.data_sets(256).next().unwrap();
    let nodes: Vec<u8> = definition
        .records(body)
        .unwrap()
        .map(|record| {
            let fields = definition.field_values(record);
            assert_eq!(fields[2].1, &sender.octets());
            fields[0].1[1]
        })
        .collect();
    assert_eq!(nodes, vec![1, 2, 3, 4]);
}
