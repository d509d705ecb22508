use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sdk::Client;
use crate::{DeleteReceipt, EntityRecord, Error, ListQuery, Page, Result};

pub const EMPLOYEE_MODEL: &str = "hr.employee";
pub const LEAD_MODEL: &str = "crm.lead";

/// Typed view of an `hr.employee` record. Unknown backend fields are
/// simply ignored; absent optional fields stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_phone: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Typed view of a `crm.lead` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_revenue: Option<f64>,
}

fn default_active() -> bool {
    true
}

fn decode<T: DeserializeOwned>(record: EntityRecord) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(record))?)
}

fn encode<T: Serialize>(value: &T) -> Result<EntityRecord> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(Error::Internal(
            "entity did not serialize to an object".to_string(),
        )),
    }
}

/// Convenience API over `hr.employee`, a thin typed veneer on the generic
/// client.
pub struct EmployeeApi<'a> {
    client: &'a Client,
}

impl<'a> EmployeeApi<'a> {
    pub async fn list(&self, query: &ListQuery) -> Result<Page<Employee>> {
        self.client
            .list(EMPLOYEE_MODEL, query)
            .await?
            .try_map(decode::<Employee>)
    }

    pub async fn search(&self, text: &str) -> Result<Page<Employee>> {
        self.list(&ListQuery::default().search(text)).await
    }

    pub async fn get(&self, id: i64) -> Result<Employee> {
        decode(self.client.get(EMPLOYEE_MODEL, id, None).await?)
    }

    pub async fn create(&self, employee: &Employee) -> Result<Employee> {
        let created = self.client.create(EMPLOYEE_MODEL, encode(employee)?).await?;
        decode(created)
    }

    pub async fn update(&self, id: i64, values: EntityRecord) -> Result<Employee> {
        decode(self.client.update(EMPLOYEE_MODEL, id, values).await?)
    }

    pub async fn delete(&self, id: i64) -> Result<DeleteReceipt> {
        self.client.delete(EMPLOYEE_MODEL, id).await
    }
}

/// Convenience API over `crm.lead`.
pub struct LeadApi<'a> {
    client: &'a Client,
}

impl<'a> LeadApi<'a> {
    pub async fn list(&self, query: &ListQuery) -> Result<Page<Lead>> {
        self.client
            .list(LEAD_MODEL, query)
            .await?
            .try_map(decode::<Lead>)
    }

    pub async fn search(&self, text: &str) -> Result<Page<Lead>> {
        self.list(&ListQuery::default().search(text)).await
    }

    pub async fn get(&self, id: i64) -> Result<Lead> {
        decode(self.client.get(LEAD_MODEL, id, None).await?)
    }

    pub async fn create(&self, lead: &Lead) -> Result<Lead> {
        let created = self.client.create(LEAD_MODEL, encode(lead)?).await?;
        decode(created)
    }

    pub async fn delete(&self, id: i64) -> Result<DeleteReceipt> {
        self.client.delete(LEAD_MODEL, id).await
    }
}

impl Client {
    pub fn employees(&self) -> EmployeeApi<'_> {
        EmployeeApi { client: self }
    }

    pub fn leads(&self) -> LeadApi<'_> {
        LeadApi { client: self }
    }
}
