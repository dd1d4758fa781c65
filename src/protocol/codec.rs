//! SNMP message BER codec (RFC 1157 §4, RFC 3416 §3, RFC 3412 §6 for v3
//! framing). Real definite-length BER encode/decode, required for the
//! round-trip property (§8).

use crate::model::{
    AsnValue, BulkPdu, ErrorStatus, MsgFlags, Oid, Pdu, PduBody, PduType, SnmpMessage,
    SnmpVersion, UsmSecurityParameters, V3Header, VarBind,
};
use crate::protocol::ber::{self, Tlv};
use crate::{Error, Result};

pub fn encode_value(value: &AsnValue) -> Vec<u8> {
    match value {
        AsnValue::Integer32(v) => ber::encode_integer(*v as i64),
        AsnValue::OctetString(bytes) => ber::encode_octet_string(bytes),
        AsnValue::ObjectIdentifier(oid) => ber::encode_oid(oid),
        AsnValue::IpAddress(octets) => ber::encode_tlv(ber::TAG_IP_ADDRESS, octets),
        AsnValue::Counter32(v) => ber::encode_tlv(ber::TAG_COUNTER32, &uint_content(*v as u64)),
        AsnValue::Gauge32(v) => ber::encode_tlv(ber::TAG_GAUGE32, &uint_content(*v as u64)),
        AsnValue::TimeTicks(v) => ber::encode_tlv(ber::TAG_TIME_TICKS, &uint_content(*v as u64)),
        AsnValue::Opaque(bytes) => ber::encode_tlv(ber::TAG_OPAQUE, bytes),
        AsnValue::Counter64(v) => ber::encode_tlv(ber::TAG_COUNTER64, &uint_content(*v)),
        AsnValue::NoSuchObject => ber::encode_tlv(ber::TAG_NO_SUCH_OBJECT, &[]),
        AsnValue::NoSuchInstance => ber::encode_tlv(ber::TAG_NO_SUCH_INSTANCE, &[]),
        AsnValue::EndOfMibView => ber::encode_tlv(ber::TAG_END_OF_MIB_VIEW, &[]),
    }
}

/// Unsigned BER content: like a signed INTEGER's minimal encoding, but an
/// extra leading zero is inserted whenever the top bit is set so it is
/// never misread as negative.
fn uint_content(value: u64) -> Vec<u8> {
    let mut bytes = value.to_be_bytes().to_vec();
    while bytes.len() > 1 && bytes[0] == 0x00 && bytes[1] & 0x80 == 0 {
        bytes.remove(0);
    }
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0x00);
    }
    bytes
}

fn decode_uint(content: &[u8]) -> Result<u64> {
    let mut value: u64 = 0;
    for b in content {
        value = (value << 8) | (*b as u64);
    }
    Ok(value)
}

pub fn decode_value(tlv: &Tlv) -> Result<AsnValue> {
    Ok(match tlv.tag {
        ber::TAG_INTEGER => AsnValue::Integer32(ber::decode_integer(&tlv.content)? as i32),
        ber::TAG_OCTET_STRING => AsnValue::OctetString(tlv.content.clone()),
        ber::TAG_OID => AsnValue::ObjectIdentifier(ber::decode_oid(&tlv.content)?),
        ber::TAG_NULL => AsnValue::OctetString(Vec::new()),
        ber::TAG_IP_ADDRESS => {
            if tlv.content.len() != 4 {
                return Err(Error::decode("IpAddress must be 4 bytes"));
            }
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&tlv.content);
            AsnValue::IpAddress(octets)
        }
        ber::TAG_COUNTER32 => AsnValue::Counter32(decode_uint(&tlv.content)? as u32),
        ber::TAG_GAUGE32 => AsnValue::Gauge32(decode_uint(&tlv.content)? as u32),
        ber::TAG_TIME_TICKS => AsnValue::TimeTicks(decode_uint(&tlv.content)? as u32),
        ber::TAG_OPAQUE => AsnValue::Opaque(tlv.content.clone()),
        ber::TAG_COUNTER64 => AsnValue::Counter64(decode_uint(&tlv.content)?),
        ber::TAG_NO_SUCH_OBJECT => AsnValue::NoSuchObject,
        ber::TAG_NO_SUCH_INSTANCE => AsnValue::NoSuchInstance,
        ber::TAG_END_OF_MIB_VIEW => AsnValue::EndOfMibView,
        other => return Err(Error::decode(format!("unrecognized value tag: 0x{other:02x}"))),
    })
}

pub fn encode_varbind(vb: &VarBind) -> Vec<u8> {
    let mut content = ber::encode_oid(&vb.oid);
    content.extend(encode_value(&vb.value));
    ber::encode_tlv(ber::TAG_SEQUENCE, &content)
}

fn decode_varbind(tlv: &Tlv) -> Result<VarBind> {
    let fields = ber::read_all(&tlv.content)?;
    if fields.len() != 2 {
        return Err(Error::decode("VarBind must have exactly 2 fields"));
    }
    let oid = ber::decode_oid(&fields[0].content)?;
    let value = decode_value(&fields[1])?;
    Ok(VarBind::new(oid, value))
}

fn encode_varbind_list(var_binds: &[VarBind]) -> Vec<u8> {
    let mut content = Vec::new();
    for vb in var_binds {
        content.extend(encode_varbind(vb));
    }
    ber::encode_tlv(ber::TAG_SEQUENCE, &content)
}

fn decode_varbind_list(tlv: &Tlv) -> Result<Vec<VarBind>> {
    ber::read_all(&tlv.content)?
        .iter()
        .map(decode_varbind)
        .collect()
}

pub fn encode_pdu_body(pdu_type: PduType, body: &PduBody) -> Vec<u8> {
    match body {
        PduBody::Plain(pdu) => {
            let mut content = ber::encode_integer(pdu.request_id as i64);
            content.extend(ber::encode_integer(pdu.error_status.wire_value()));
            content.extend(ber::encode_integer(pdu.error_index as i64));
            content.extend(encode_varbind_list(&pdu.var_binds));
            ber::encode_tlv(pdu_type.ber_tag(), &content)
        }
        PduBody::Bulk(bulk) => {
            let mut content = ber::encode_integer(bulk.request_id as i64);
            content.extend(ber::encode_integer(bulk.non_repeaters as i64));
            content.extend(ber::encode_integer(bulk.max_repetitions as i64));
            content.extend(encode_varbind_list(&bulk.var_binds));
            ber::encode_tlv(PduType::GetBulkRequest.ber_tag(), &content)
        }
    }
}

pub fn decode_pdu_body(tlv: &Tlv) -> Result<(PduType, PduBody)> {
    let pdu_type = PduType::from_ber_tag(tlv.tag)
        .ok_or_else(|| Error::decode(format!("unrecognized PDU tag: 0x{:02x}", tlv.tag)))?;
    let fields = ber::read_all(&tlv.content)?;
    if pdu_type == PduType::GetBulkRequest {
        if fields.len() != 4 {
            return Err(Error::decode("GetBulkRequest must have 4 fields"));
        }
        let request_id = ber::decode_integer(&fields[0].content)? as i32;
        let non_repeaters = ber::decode_integer(&fields[1].content)? as i32;
        let max_repetitions = ber::decode_integer(&fields[2].content)? as i32;
        let var_binds = decode_varbind_list(&fields[3])?;
        return Ok((
            pdu_type,
            PduBody::Bulk(BulkPdu {
                request_id,
                non_repeaters,
                max_repetitions,
                var_binds,
            }),
        ));
    }
    if fields.len() != 4 {
        return Err(Error::decode("PDU must have 4 fields"));
    }
    let request_id = ber::decode_integer(&fields[0].content)? as i32;
    let error_status = ErrorStatus::from_wire_value(ber::decode_integer(&fields[1].content)?)
        .ok_or_else(|| Error::decode("unrecognized errorStatus"))?;
    let error_index = ber::decode_integer(&fields[2].content)? as i32;
    let var_binds = decode_varbind_list(&fields[3])?;
    Ok((
        pdu_type,
        PduBody::Plain(Pdu {
            request_id,
            error_status,
            error_index,
            var_binds,
        }),
    ))
}

/// Encodes a full v1/v2c message, or a v3 message whose scoped PDU is sent
/// in the clear (no privacy protocol applied — USM encryption is layered on
/// top by `protocol::usm` when a message needs it).
pub fn encode_message(message: &SnmpMessage) -> Result<Vec<u8>> {
    let mut content = ber::encode_integer(message.version.wire_value() as i64);
    match message.version {
        SnmpVersion::V1 | SnmpVersion::V2c => {
            let community = message
                .community
                .as_deref()
                .ok_or_else(|| Error::encode("v1/v2c message missing community"))?;
            content.extend(ber::encode_octet_string(community.as_bytes()));
            content.extend(encode_pdu_body(message.pdu_type, &message.body));
        }
        SnmpVersion::V3 => {
            let header = message
                .v3
                .as_ref()
                .ok_or_else(|| Error::encode("v3 message missing header"))?;
            content.extend(encode_global_data(header));
            content.extend(ber::encode_octet_string(&encode_security_parameters(
                &header.security_params,
            )));
            content.extend(encode_scoped_pdu(header, message.pdu_type, &message.body));
        }
    }
    Ok(ber::encode_tlv(ber::TAG_SEQUENCE, &content))
}

fn encode_global_data(header: &V3Header) -> Vec<u8> {
    let mut inner = ber::encode_integer(header.msg_id as i64);
    inner.extend(ber::encode_integer(header.msg_max_size as i64));
    inner.extend(ber::encode_octet_string(&[header.msg_flags.to_byte()]));
    inner.extend(ber::encode_integer(3)); // USM security model
    ber::encode_tlv(ber::TAG_SEQUENCE, &inner)
}

fn encode_security_parameters(params: &UsmSecurityParameters) -> Vec<u8> {
    let mut inner = ber::encode_octet_string(&params.engine_id);
    inner.extend(ber::encode_integer(params.engine_boots as i64));
    inner.extend(ber::encode_integer(params.engine_time as i64));
    inner.extend(ber::encode_octet_string(params.user_name.as_bytes()));
    inner.extend(ber::encode_octet_string(&params.auth_params));
    inner.extend(ber::encode_octet_string(&params.priv_params));
    ber::encode_tlv(ber::TAG_SEQUENCE, &inner)
}

/// Encodes the plaintext `{ contextEngineID, contextName, data }` scoped PDU
/// content. Exposed so `protocol::engine` can encrypt it directly (RFC 3412
/// §6.4's `encryptedPDU OCTET STRING` choice) rather than going through
/// [`encode_message`], which always frames an unencrypted scoped PDU.
pub fn encode_scoped_pdu(header: &V3Header, pdu_type: PduType, body: &PduBody) -> Vec<u8> {
    let mut inner = ber::encode_octet_string(&header.context_engine_id);
    inner.extend(ber::encode_octet_string(header.context_name.as_bytes()));
    inner.extend(encode_pdu_body(pdu_type, body));
    ber::encode_tlv(ber::TAG_SEQUENCE, &inner)
}

/// Encodes a full v3 message whose scoped PDU has already been encrypted
/// (RFC 3412 §6.4). `header.security_params` must already carry the final
/// `privParameters`/`authParameters` (zero-filled if the digest is still
/// pending computation).
pub fn encode_message_with_ciphertext(header: &V3Header, ciphertext: &[u8]) -> Vec<u8> {
    let mut content = ber::encode_integer(SnmpVersion::V3.wire_value());
    content.extend(encode_global_data(header));
    content.extend(ber::encode_octet_string(&encode_security_parameters(
        &header.security_params,
    )));
    content.extend(ber::encode_octet_string(ciphertext));
    ber::encode_tlv(ber::TAG_SEQUENCE, &content)
}

/// Decodes a message. For v3 with the privacy flag set, `scoped_pdu` in the
/// returned header slot is left as the encrypted OCTET STRING content —
/// callers must decrypt it with `protocol::usm` and call
/// [`decode_scoped_pdu`] themselves before the `body`/`context_name` fields
/// are meaningful (both default to an empty GetRequest/"" until then).
pub fn decode_message(data: &[u8]) -> Result<(SnmpMessage, Option<Vec<u8>>)> {
    let (outer, _) = ber::read_tlv(data, 0)?;
    if outer.tag != ber::TAG_SEQUENCE {
        return Err(Error::decode("message is not a SEQUENCE"));
    }
    let (version_tlv, after_version) = ber::read_tlv(&outer.content, 0)?;
    let version_code = ber::decode_integer(&version_tlv.content)?;
    let version = SnmpVersion::from_wire_value(version_code)
        .ok_or_else(|| Error::decode(format!("unrecognized SNMP version: {version_code}")))?;

    match version {
        SnmpVersion::V1 | SnmpVersion::V2c => {
            let (community_tlv, after_community) = ber::read_tlv(&outer.content, after_version)?;
            let community = String::from_utf8(community_tlv.content)
                .map_err(|_| Error::decode("community is not valid UTF-8"))?;
            let (pdu_tlv, _) = ber::read_tlv(&outer.content, after_community)?;
            let (pdu_type, body) = decode_pdu_body(&pdu_tlv)?;
            Ok((
                SnmpMessage {
                    version,
                    pdu_type,
                    community: Some(community),
                    v3: None,
                    body,
                },
                None,
            ))
        }
        SnmpVersion::V3 => {
            let (global_data_tlv, after_global) = ber::read_tlv(&outer.content, after_version)?;
            let (msg_id, msg_max_size, msg_flags) = decode_global_data(&global_data_tlv)?;
            let (sec_params_tlv, after_sec) = ber::read_tlv(&outer.content, after_global)?;
            let security_params = decode_security_parameters(&sec_params_tlv.content)?;
            let (scoped_tlv, _) = ber::read_tlv(&outer.content, after_sec)?;

            if msg_flags.priv {
                let header = V3Header {
                    msg_id,
                    msg_max_size,
                    msg_flags,
                    security_params,
                    context_engine_id: Vec::new(),
                    context_name: String::new(),
                };
                return Ok((
                    SnmpMessage {
                        version,
                        pdu_type: PduType::GetRequest,
                        community: None,
                        v3: Some(header),
                        body: PduBody::Plain(Pdu::new(0, Vec::new())),
                    },
                    Some(scoped_tlv.content),
                ));
            }

            let (context_engine_id, context_name, pdu_type, body) =
                decode_scoped_pdu(&scoped_tlv.content)?;
            Ok((
                SnmpMessage {
                    version,
                    pdu_type,
                    community: None,
                    v3: Some(V3Header {
                        msg_id,
                        msg_max_size,
                        msg_flags,
                        security_params,
                        context_engine_id,
                        context_name,
                    }),
                    body,
                },
                None,
            ))
        }
    }
}

fn decode_global_data(tlv: &Tlv) -> Result<(i32, i32, MsgFlags)> {
    let fields = ber::read_all(&tlv.content)?;
    if fields.len() != 4 {
        return Err(Error::decode("msgGlobalData must have 4 fields"));
    }
    let msg_id = ber::decode_integer(&fields[0].content)? as i32;
    let msg_max_size = ber::decode_integer(&fields[1].content)? as i32;
    let flags_byte = *fields[2].content.first().unwrap_or(&0);
    Ok((msg_id, msg_max_size, MsgFlags::from_byte(flags_byte)))
}

fn decode_security_parameters(content: &[u8]) -> Result<UsmSecurityParameters> {
    let fields = ber::read_all(content)?;
    if fields.len() != 6 {
        return Err(Error::decode("USM security parameters must have 6 fields"));
    }
    Ok(UsmSecurityParameters {
        engine_id: fields[0].content.clone(),
        engine_boots: ber::decode_integer(&fields[1].content)? as i32,
        engine_time: ber::decode_integer(&fields[2].content)? as i32,
        user_name: String::from_utf8(fields[3].content.clone())
            .map_err(|_| Error::decode("usmUserName is not valid UTF-8"))?,
        auth_params: fields[4].content.clone(),
        priv_params: fields[5].content.clone(),
    })
}

/// Re-encodes `message` with its `auth_params` zero-filled to `wire_len`
/// bytes, matching what the sender hashed before filling in the real digest
/// (RFC 3414 §6.3.1). Our BER encoder is canonical (definite, minimal-length
/// form), so this reproduces the exact bytes a compliant sender transmitted.
pub fn encode_message_for_auth(message: &SnmpMessage, wire_len: usize) -> Result<Vec<u8>> {
    let mut zeroed = message.clone();
    if let Some(header) = zeroed.v3.as_mut() {
        header.security_params.auth_params = vec![0u8; wire_len];
    }
    encode_message(&zeroed)
}

/// Decodes a scoped PDU (`{ contextEngineID, contextName, data }`), used
/// directly for unencrypted v3 messages and by callers after USM decryption.
pub fn decode_scoped_pdu(content: &[u8]) -> Result<(Vec<u8>, String, PduType, PduBody)> {
    let fields = ber::read_all(content)?;
    if fields.len() != 3 {
        return Err(Error::decode("scopedPDU must have 3 fields"));
    }
    let context_engine_id = fields[0].content.clone();
    let context_name = String::from_utf8(fields[1].content.clone())
        .map_err(|_| Error::decode("contextName is not valid UTF-8"))?;
    let (pdu_type, body) = decode_pdu_body(&fields[2])?;
    Ok((context_engine_id, context_name, pdu_type, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Oid, SnmpVersion, VarBind};

    fn sample_pdu() -> SnmpMessage {
        SnmpMessage {
            version: SnmpVersion::V2c,
            pdu_type: PduType::GetRequest,
            community: Some("public".into()),
            v3: None,
            body: PduBody::Plain(Pdu::new(
                1,
                vec![VarBind::new(
                    Oid::from_str("1.3.6.1.2.1.1.1.0").unwrap(),
                    AsnValue::OctetString(b"Mock SNMP Agent".to_vec()),
                )],
            )),
        }
    }

    #[test]
    fn v2c_get_request_round_trips() {
        let message = sample_pdu();
        let encoded = encode_message(&message).unwrap();
        let (decoded, ciphertext) = decode_message(&encoded).unwrap();
        assert!(ciphertext.is_none());
        assert_eq!(decoded.version, SnmpVersion::V2c);
        assert_eq!(decoded.community.as_deref(), Some("public"));
        match decoded.body {
            PduBody::Plain(pdu) => {
                assert_eq!(pdu.request_id, 1);
                assert_eq!(pdu.var_binds.len(), 1);
                assert_eq!(
                    pdu.var_binds[0].value,
                    AsnValue::OctetString(b"Mock SNMP Agent".to_vec())
                );
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn response_with_error_round_trips() {
        let pdu = Pdu::error(
            7,
            ErrorStatus::NoSuchName,
            1,
            vec![VarBind::new(
                Oid::from_str("1.3.6.1.2.1.1.99.0").unwrap(),
                AsnValue::NoSuchObject,
            )],
        );
        let message = SnmpMessage {
            version: SnmpVersion::V1,
            pdu_type: PduType::Response,
            community: Some("public".into()),
            v3: None,
            body: PduBody::Plain(pdu),
        };
        let encoded = encode_message(&message).unwrap();
        let (decoded, _) = decode_message(&encoded).unwrap();
        match decoded.body {
            PduBody::Plain(pdu) => {
                assert_eq!(pdu.error_status, ErrorStatus::NoSuchName);
                assert_eq!(pdu.error_index, 1);
                assert_eq!(pdu.var_binds[0].value, AsnValue::NoSuchObject);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn get_bulk_round_trips() {
        let bulk = BulkPdu {
            request_id: 42,
            non_repeaters: 1,
            max_repetitions: 5,
            var_binds: vec![VarBind::new(
                Oid::from_str("1.3.6.1.2.1.2.2.1.2").unwrap(),
                AsnValue::NoSuchInstance,
            )],
        };
        let message = SnmpMessage {
            version: SnmpVersion::V2c,
            pdu_type: PduType::GetBulkRequest,
            community: Some("public".into()),
            v3: None,
            body: PduBody::Bulk(bulk),
        };
        let encoded = encode_message(&message).unwrap();
        let (decoded, _) = decode_message(&encoded).unwrap();
        match decoded.body {
            PduBody::Bulk(b) => {
                assert_eq!(b.request_id, 42);
                assert_eq!(b.non_repeaters, 1);
                assert_eq!(b.max_repetitions, 5);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn counter64_and_ip_address_round_trip() {
        let value = AsnValue::Counter64(18_446_744_073_709_551_615);
        let encoded = encode_value(&value);
        let (tlv, _) = ber::read_tlv(&encoded, 0).unwrap();
        assert_eq!(decode_value(&tlv).unwrap(), value);

        let ip = AsnValue::IpAddress([255, 0, 128, 1]);
        let encoded_ip = encode_value(&ip);
        let (tlv, _) = ber::read_tlv(&encoded_ip, 0).unwrap();
        assert_eq!(decode_value(&tlv).unwrap(), ip);
    }

    #[test]
    fn v3_unencrypted_round_trips_scoped_pdu() {
        let header = V3Header {
            msg_id: 7,
            msg_max_size: 1472,
            msg_flags: MsgFlags {
                auth: true,
                priv: false,
                reportable: true,
            },
            security_params: UsmSecurityParameters {
                engine_id: vec![0x80, 0x00, 0x1f, 0x88, 0x80],
                engine_boots: 1,
                engine_time: 100,
                user_name: "simulator".into(),
                auth_params: vec![0; 12],
                priv_params: vec![],
            },
            context_engine_id: vec![0x80, 0x00, 0x1f, 0x88, 0x80],
            context_name: String::new(),
        };
        let message = SnmpMessage {
            version: SnmpVersion::V3,
            pdu_type: PduType::GetRequest,
            community: None,
            v3: Some(header),
            body: PduBody::Plain(Pdu::new(
                9,
                vec![VarBind::new(
                    Oid::from_str("1.3.6.1.2.1.1.1.0").unwrap(),
                    AsnValue::OctetString(b"agent".to_vec()),
                )],
            )),
        };
        let encoded = encode_message(&message).unwrap();
        let (decoded, ciphertext) = decode_message(&encoded).unwrap();
        assert!(ciphertext.is_none());
        let decoded_header = decoded.v3.unwrap();
        assert_eq!(decoded_header.security_params.user_name, "simulator");
        assert_eq!(decoded_header.security_params.engine_boots, 1);
    }
}
