//! Services: ports, selector, then type.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};

use super::{compare_string_maps, ensure_count, ensure_same, notice, shown, Verdict};

/// Name, number and protocol rendered as one comparable value.
fn port_key(port: &ServicePort) -> String {
	format!(
		"{}:{}/{}",
		port.name.as_deref().unwrap_or_default(),
		port.port,
		port.protocol.as_deref().unwrap_or("TCP")
	)
}

fn compare_ports(first: &[ServicePort], second: &[ServicePort]) -> Verdict {
	ensure_count("port", first.len(), second.len())?;
	for (index, (a, b)) in first.iter().zip(second).enumerate() {
		ensure_same(&format!("port #{index}"), &port_key(a), &port_key(b))?;
	}
	Ok(())
}

/// Ports and selector are critical; a different service type is reported as
/// a warning.
pub fn compare_services(first: &Service, second: &Service) -> Verdict {
	let empty = ServiceSpec::default();
	let a = first.spec.as_ref().unwrap_or(&empty);
	let b = second.spec.as_ref().unwrap_or(&empty);

	compare_ports(
		a.ports.as_deref().unwrap_or_default(),
		b.ports.as_deref().unwrap_or_default(),
	)?;

	let no_selector = BTreeMap::new();
	compare_string_maps(
		"selector",
		a.selector.as_ref().unwrap_or(&no_selector),
		b.selector.as_ref().unwrap_or(&no_selector),
	)?;

	if a.type_ != b.type_ {
		return Err(notice(format!(
			"type differs: {} vs {}",
			shown(a.type_.as_deref()),
			shown(b.type_.as_deref())
		)));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

	use super::*;
	use crate::{
		compare::tests::{map, message, severity},
		storage::Severity,
	};

	fn port(name: Option<&str>, port: i32, protocol: Option<&str>) -> ServicePort {
		ServicePort {
			name: name.map(String::from),
			port,
			protocol: protocol.map(String::from),
			target_port: Some(IntOrString::Int(8080)),
			..ServicePort::default()
		}
	}

	fn service(ports: Vec<ServicePort>, selector: &[(&str, &str)], type_: Option<&str>) -> Service {
		Service {
			spec: Some(ServiceSpec {
				ports: Some(ports),
				selector: Some(map(selector)),
				type_: type_.map(String::from),
				..ServiceSpec::default()
			}),
			..Service::default()
		}
	}

	#[test]
	fn test_equal_services() {
		let s = service(vec![port(Some("http"), 80, None)], &[("app", "web")], Some("ClusterIP"));
		assert!(compare_services(&s, &s.clone()).is_ok());
	}

	#[test]
	fn test_default_protocol_is_tcp() {
		let first = service(vec![port(None, 80, None)], &[], None);
		let second = service(vec![port(None, 80, Some("TCP"))], &[], None);
		assert!(compare_services(&first, &second).is_ok());
	}

	#[test]
	fn test_port_count() {
		let first = service(vec![port(None, 80, None), port(None, 443, None)], &[], None);
		let second = service(vec![port(None, 80, None)], &[], None);
		assert_eq!(
			message(compare_services(&first, &second)),
			"port count differs: 2 vs 1"
		);
	}

	#[test]
	fn test_port_number() {
		let first = service(vec![port(Some("http"), 80, None)], &[], None);
		let second = service(vec![port(Some("http"), 8080, None)], &[], None);
		assert_eq!(
			message(compare_services(&first, &second)),
			"port #0 differs: http:80/TCP vs http:8080/TCP"
		);
	}

	#[test]
	fn test_ports_before_selector() {
		let first = service(vec![port(None, 53, Some("UDP"))], &[("app", "dns")], None);
		let second = service(vec![port(None, 53, Some("TCP"))], &[("app", "web")], None);
		assert_eq!(
			message(compare_services(&first, &second)),
			"port #0 differs: :53/UDP vs :53/TCP"
		);
	}

	#[test]
	fn test_selector() {
		let first = service(vec![], &[("app", "web")], None);
		let second = service(vec![], &[("app", "api")], None);
		assert_eq!(
			message(compare_services(&first, &second)),
			"selector \"app\" differs: \"web\" vs \"api\""
		);
	}

	#[test]
	fn test_type_is_a_warning() {
		let first = service(vec![], &[], Some("ClusterIP"));
		let second = service(vec![], &[], Some("LoadBalancer"));
		let verdict = compare_services(&first, &second);
		assert_eq!(severity(compare_services(&first, &second)), Severity::Warning);
		assert_eq!(message(verdict), "type differs: ClusterIP vs LoadBalancer");
	}
}
