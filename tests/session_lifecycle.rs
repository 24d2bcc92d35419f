#![expect(clippy::unwrap_used, reason = "test assertions")]
#![expect(clippy::indexing_slicing, reason = "test code with known bounds")]
#![expect(missing_docs, reason = "test file")]

//! End-to-end scenarios against a hand-rolled fake server speaking the
//! binary transport: open a server, enumerate, open a core, read a
//! register through `execute_txlist`, then close down.

mod common;

use common::{read_opcode, sample_core_con_info, write_reply};
use mcd_client::codec::request::Opcode;
use mcd_client::codec::value::{
    Addr, AddrSpaceType, Endian, McdReturn, MemSpace, MemType, Tx, TxAccessOpt, TxAccessType,
    TxList,
};
use mcd_client::error;
use mcd_client::facade::ServerHandle;
use tokio::net::TcpListener;

fn sample_mem_space() -> MemSpace {
    MemSpace {
        mem_space_id: 1,
        mem_space_name: "ram".to_string(),
        mem_type: MemType::Mem,
        bits_per_mau: 8,
        invariance: true,
        endian: Endian::Little,
        min_addr: 0,
        max_addr: 0xFFFF,
        num_mem_blocks: 1,
        supported_access_options: TxAccessOpt::NONE,
        core_mode_mask_read: 0xFFFF_FFFF,
        core_mode_mask_write: 0xFFFF_FFFF,
    }
}

#[tokio::test]
async fn enumerate_open_core_and_read_register_over_real_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        // open-server
        read_opcode(&mut stream, Opcode::OpenServer).await;
        let mut reply = Vec::new();
        reply.extend_from_slice(&u32::from(McdReturn::Ok).to_le_bytes());
        reply.push(1);
        reply.extend_from_slice(&42_u32.to_le_bytes());
        reply.push(0);
        reply.push(0);
        write_reply(&mut stream, &reply).await;

        // qry-systems
        read_opcode(&mut stream, Opcode::QrySystems).await;
        let mut reply = Vec::new();
        reply.extend_from_slice(&u32::from(McdReturn::Ok).to_le_bytes());
        reply.extend_from_slice(&1_u32.to_le_bytes());
        reply.extend_from_slice(&1_u32.to_le_bytes());
        sample_core_con_info().marshal(&mut reply);
        write_reply(&mut stream, &reply).await;

        // open-core
        read_opcode(&mut stream, Opcode::OpenCore).await;
        let mut reply = Vec::new();
        reply.extend_from_slice(&u32::from(McdReturn::Ok).to_le_bytes());
        reply.push(1);
        reply.extend_from_slice(&7_u32.to_le_bytes());
        write_reply(&mut stream, &reply).await;

        // qry-mem-spaces probe (count == 0) then fetch (count == 1)
        read_opcode(&mut stream, Opcode::QryMemSpaces).await;
        let mut reply = Vec::new();
        reply.extend_from_slice(&u32::from(McdReturn::Ok).to_le_bytes());
        reply.extend_from_slice(&1_u32.to_le_bytes());
        reply.extend_from_slice(&0_u32.to_le_bytes());
        write_reply(&mut stream, &reply).await;

        read_opcode(&mut stream, Opcode::QryMemSpaces).await;
        let mut reply = Vec::new();
        reply.extend_from_slice(&u32::from(McdReturn::Ok).to_le_bytes());
        reply.extend_from_slice(&1_u32.to_le_bytes());
        reply.extend_from_slice(&1_u32.to_le_bytes());
        sample_mem_space().marshal(&mut reply);
        write_reply(&mut stream, &reply).await;

        // qry-reg-groups probe: none known
        read_opcode(&mut stream, Opcode::QryRegGroups).await;
        let mut reply = Vec::new();
        reply.extend_from_slice(&u32::from(McdReturn::Ok).to_le_bytes());
        reply.extend_from_slice(&0_u32.to_le_bytes());
        reply.extend_from_slice(&0_u32.to_le_bytes());
        write_reply(&mut stream, &reply).await;

        // execute-txlist
        read_opcode(&mut stream, Opcode::ExecuteTxlist).await;
        let server_tx = Tx {
            addr: Addr {
                address: 0x1000,
                mem_space_id: 1,
                addr_space_id: 0,
                addr_space_type: AddrSpaceType::Mem,
            },
            access_type: TxAccessType::Read,
            options: TxAccessOpt::NONE,
            access_width: 4,
            core_mode: 0,
            data: vec![0xDE, 0xAD, 0xBE, 0xEF],
            num_bytes_ok: 4,
        };
        let server_list = TxList {
            tx: vec![server_tx],
            num_tx_ok: 1,
        };
        let mut reply = Vec::new();
        reply.extend_from_slice(&u32::from(McdReturn::Ok).to_le_bytes());
        reply.push(1);
        server_list.marshal(&mut reply);
        write_reply(&mut stream, &reply).await;

        // close-server
        read_opcode(&mut stream, Opcode::CloseServer).await;
        let mut reply = Vec::new();
        reply.extend_from_slice(&u32::from(McdReturn::Ok).to_le_bytes());
        write_reply(&mut stream, &reply).await;
    });

    let config = format!("{}:{}", addr.ip(), addr.port());
    let mut handle = ServerHandle::open_server(&config, "").await.unwrap();

    let systems = handle
        .qry_systems(sample_core_con_info(), 0, 1)
        .await
        .unwrap();
    assert_eq!(systems.num_found, 1);

    let core_uid = handle.open_core(sample_core_con_info()).await.unwrap();
    assert_eq!(core_uid, 7);

    let client_tx = Tx {
        addr: Addr {
            address: 0x1000,
            mem_space_id: 1,
            addr_space_id: 0,
            addr_space_type: AddrSpaceType::Mem,
        },
        access_type: TxAccessType::Read,
        options: TxAccessOpt::NONE,
        access_width: 4,
        core_mode: 0,
        data: vec![0; 4],
        num_bytes_ok: 0,
    };
    let result = handle
        .execute_txlist(core_uid, TxList { tx: vec![client_tx], num_tx_ok: 0 })
        .await
        .unwrap();
    assert_eq!(result.tx[0].data, vec![0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(error::current(), error::LastError::Ok);

    handle.close_server().await.unwrap();
    server.await.unwrap();
}
