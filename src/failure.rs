//! Human-readable descriptions for ICMP error type/code pairs.
//!
//! Purely informational: classification of a probe never depends on these strings.

const DESTINATION_UNREACHABLE: u8 = 3;
const SOURCE_QUENCH: u8 = 4;
const REDIRECT: u8 = 5;
const TIME_EXCEEDED: u8 = 11;
const PARAMETER_PROBLEM: u8 = 12;

/// Describes an ICMP `(type, code)` pair. Total: unmapped pairs fall back to
/// an `unknown_type_code` description instead of failing.
pub fn describe(icmp_type: u8, icmp_code: u8) -> String {
    match category(icmp_type, icmp_code) {
        Some((kind, Some(detail))) => format!("{kind}: {detail}"),
        Some((kind, None)) => kind.to_string(),
        None => format!("unknown_type_code: type={icmp_type} code={icmp_code}"),
    }
}

fn category(icmp_type: u8, icmp_code: u8) -> Option<(&'static str, Option<&'static str>)> {
    let named = match (icmp_type, icmp_code) {
        (DESTINATION_UNREACHABLE, code) => {
            let detail = match code {
                0 => "network_unreachable",
                1 => "host_unreachable",
                2 => "protocol_unreachable",
                3 => "port_unreachable",
                4 => "fragmentation_needed_and_df_set",
                5 => "source_route_failed",
                6 => "destination_network_unknown",
                7 => "destination_host_unknown",
                8 => "source_host_isolated",
                9 => "network_administratively_prohibited",
                10 => "host_administratively_prohibited",
                11 => "network_unreachable_for_tos",
                12 => "host_unreachable_for_tos",
                13 => "communication_administratively_prohibited",
                14 => "host_precedence_violation",
                15 => "precedence_cutoff_in_effect",
                _ => return None,
            };
            ("destination_unreachable", Some(detail))
        }
        (SOURCE_QUENCH, 0) => ("source_quench", None),
        (REDIRECT, code) => {
            let detail = match code {
                0 => "redirect_for_network",
                1 => "redirect_for_host",
                2 => "redirect_for_tos_and_network",
                3 => "redirect_for_tos_and_host",
                _ => return None,
            };
            ("redirect", Some(detail))
        }
        (TIME_EXCEEDED, code) => {
            let detail = match code {
                0 => "ttl_exceeded_in_transit",
                1 => "fragment_reassembly_time_exceeded",
                _ => return None,
            };
            ("time_exceeded", Some(detail))
        }
        (PARAMETER_PROBLEM, code) => {
            let detail = match code {
                0 => "pointer_indicates_error",
                1 => "missing_required_option",
                2 => "bad_length",
                _ => return None,
            };
            ("parameter_problem", Some(detail))
        }
        _ => return None,
    };
    Some(named)
}
